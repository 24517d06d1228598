use std::collections::HashMap;

use cab_payment_engine::{
    events::EventProducers,
    test_utils::{
        fakes::{FixedOrderContext, ScriptedGateway},
        prepare_env::{create_database, random_db_path, run_migrations},
    },
    SqliteDatabase,
    VerificationApi,
    VerificationError,
    VerificationOutcome,
};
use cucumber::World;
use log::*;

pub type TestApi = VerificationApi<SqliteDatabase, ScriptedGateway, FixedOrderContext>;

#[derive(Default, Debug, World)]
pub struct PaymentWorld {
    pub system: Option<PaymentSystem>,
    /// The result of the most recent verification of each order
    pub outcomes: HashMap<String, Vec<Result<VerificationOutcome, VerificationError>>>,
}

pub struct PaymentSystem {
    pub db_path: String,
    pub api: TestApi,
    pub gateway: ScriptedGateway,
    pub orders: FixedOrderContext,
}

impl std::fmt::Debug for PaymentSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentSystem ({})", self.db_path)
    }
}

impl PaymentWorld {
    pub fn system(&self) -> &PaymentSystem {
        self.system.as_ref().expect("Payment system not initialised")
    }

    pub fn api(&self) -> &TestApi {
        &self.system().api
    }

    pub fn last_outcome(&self, order_id: &str) -> &Result<VerificationOutcome, VerificationError> {
        self.outcomes
            .get(order_id)
            .and_then(|v| v.last())
            .unwrap_or_else(|| panic!("Order {order_id} has not been verified"))
    }
}

impl PaymentSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 25).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let gateway = ScriptedGateway::new();
        let orders = FixedOrderContext::new();
        let api = VerificationApi::new(db, gateway.clone(), orders.clone(), EventProducers::default());
        Self { db_path: url, api, gateway, orders }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
