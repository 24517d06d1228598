mod merchant_reference;

pub use merchant_reference::{new_merchant_reference, order_id_from_merchant_reference, MERCHANT_REFERENCE_PREFIX};
