use std::{
    fmt::Display,
    ops::{Add, Sub},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;

use crate::op;

pub const KRW_CURRENCY_CODE: &str = "KRW";
pub const DEFAULT_CURRENCY_CODE: &str = KRW_CURRENCY_CODE;

//--------------------------------------     MinorUnits       ---------------------------------------------------------
/// An amount of money expressed in the smallest unit of its currency (one won for KRW, one cent for USD).
///
/// The currency itself is carried alongside the amount; `MinorUnits` never converts between currencies.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct MinorUnits(i64);

op!(binary MinorUnits, Add, add);
op!(binary MinorUnits, Sub, sub);

impl From<i64> for MinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for MinorUnits {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for MinorUnits {}

impl Display for MinorUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl MinorUnits {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic() {
        let a = MinorUnits::from(15_000);
        let b = MinorUnits::from(3_000);
        assert_eq!(a - b, MinorUnits::from(12_000));
        assert_eq!(a + b, MinorUnits::from(18_000));
        assert_eq!((b - a).value(), -12_000);
    }

    #[test]
    fn display_and_sign() {
        assert_eq!(MinorUnits::from(12_000).to_string(), "12000");
        assert!(MinorUnits::from(1).is_positive());
        assert!(!MinorUnits::default().is_positive());
    }
}
