use std::{future::Future, pin::Pin};

use anyhow::Result;
use cab_common::MinorUnits;
use cab_payment_engine::{
    db_types::{NewPaymentRecord, OrderId},
    events::{EventHandler, EventHandlers, EventHooks, PaymentRejectedEvent, PaymentVerifiedEvent},
    SqliteDatabase,
    VerificationApi,
    VerificationError,
    VerificationOutcome,
};
use clap::{Args, Parser, Subcommand};
use log::*;
use portone_tools::PortOneApi;

mod config;
mod formatting;
mod gateway;

use crate::{
    config::CabConfig,
    formatting::{format_ledger, format_outcome, format_record},
    gateway::PortOneGateway,
};

type CabApi = VerificationApi<SqliteDatabase, PortOneGateway, SqliteDatabase>;

#[derive(Parser, Debug)]
#[command(version = "0.1.0", about = "CatchABite payment operator tools")]
pub struct Arguments {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[clap(name = "prepare", about = "Open a payment attempt for an order and print its merchant reference")]
    Prepare(PrepareParams),
    #[clap(name = "verify", about = "Check a payment with PortOne and record it against an order")]
    Verify(VerifyParams),
    #[clap(name = "status", about = "Show the payment status of an order")]
    Status {
        #[arg(short = 'o', long = "order")]
        order_id: String,
    },
    #[clap(name = "ledger", about = "List the ledger entries for an order")]
    Ledger {
        #[arg(short = 'o', long = "order")]
        order_id: String,
    },
    #[clap(name = "cancel", about = "Abandon a pending payment attempt")]
    Cancel(CancelParams),
    #[clap(name = "gateway", about = "Show what PortOne reports for a payment, without recording anything")]
    Gateway {
        #[arg(short = 'p', long = "payment")]
        payment_id: String,
    },
    #[clap(name = "env", about = "Print the active configuration")]
    Env,
}

#[derive(Debug, Args)]
pub struct PrepareParams {
    #[arg(short = 'o', long = "order")]
    order_id: String,
    /// The order total, in minor units (won for KRW)
    #[arg(short = 'a', long = "amount")]
    amount: i64,
    #[arg(short = 'c', long = "currency", default_value = "KRW")]
    currency: String,
    #[arg(short = 'm', long = "method", default_value = "card")]
    method: String,
}

#[derive(Debug, Args)]
pub struct VerifyParams {
    /// The PortOne payment id reported by the payment widget
    #[arg(short = 'p', long = "payment")]
    payment_id: String,
    #[arg(short = 'o', long = "order", required_unless_present = "merchant_reference")]
    order_id: Option<String>,
    /// Verify using the merchant reference handed to the widget instead of the order id
    #[arg(short = 'r', long = "reference", conflicts_with = "order_id")]
    merchant_reference: Option<String>,
}

#[derive(Debug, Args)]
pub struct CancelParams {
    #[arg(short = 'o', long = "order")]
    order_id: String,
    /// Also cancel this payment at PortOne
    #[arg(short = 'p', long = "payment")]
    payment_id: Option<String>,
    #[arg(short = 'r', long = "reason")]
    reason: Option<String>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();
    let cli = Arguments::parse();
    let config = CabConfig::from_env_or_default();
    if let Err(e) = run(cli.command, config).await {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(command: Command, config: CabConfig) -> Result<()> {
    match &command {
        Command::Env => {
            println!("{}", config.summary());
            return Ok(());
        },
        Command::Gateway { payment_id } => return print_gateway_payment(&config, payment_id).await,
        _ => {},
    }
    let handlers = EventHandlers::new(config.event_buffer_size, logging_hooks());
    let api = new_api(&config, &handlers).await?;
    let EventHandlers { on_payment_verified, on_payment_rejected } = handlers;
    // The handlers stop once the api, and with it every producer, has been dropped.
    let work = async move {
        let result = handle_command(command, &api, &config).await;
        drop(api);
        result
    };
    let (result, _, _) = tokio::join!(work, drain(on_payment_verified), drain(on_payment_rejected));
    result
}

async fn drain<E: Send + Sync + 'static>(handler: Option<EventHandler<E>>) {
    if let Some(handler) = handler {
        handler.start_handler().await;
    }
}

fn logging_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_payment_verified(|ev: PaymentVerifiedEvent| {
            Box::pin(async move {
                info!(
                    "📬️ Order {} paid. Ledger entry #{} for {} {}",
                    ev.record.order_id, ev.transaction.transaction_id, ev.transaction.amount, ev.transaction.currency
                );
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        })
        .on_payment_rejected(|ev: PaymentRejectedEvent| {
            Box::pin(async move {
                warn!(
                    "📬️ Payment {} for order {} was rejected as {}",
                    ev.gateway_payment.gateway_payment_id,
                    ev.record.order_id,
                    ev.status()
                );
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
    hooks
}

async fn new_api(config: &CabConfig, handlers: &EventHandlers) -> Result<CabApi> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.max_connections).await?;
    if config.auto_migrate {
        db.migrate().await?;
    }
    let gateway = PortOneGateway::new(PortOneApi::new(config.portone.clone())?);
    let api = VerificationApi::new(db.clone(), gateway, db, handlers.producers())
        .with_options(config.verification_options());
    Ok(api)
}

async fn handle_command(command: Command, api: &CabApi, config: &CabConfig) -> Result<()> {
    match command {
        Command::Prepare(params) => {
            let record = NewPaymentRecord::new(OrderId::from(params.order_id), MinorUnits::from(params.amount))
                .with_currency(params.currency)
                .with_payment_method(params.method);
            let record = api.prepare_payment(record).await?;
            println!("{}", format_record(&record)?);
        },
        Command::Verify(params) => {
            let result = match (params.merchant_reference, params.order_id) {
                (Some(reference), _) => api.verify_by_merchant_reference(&reference, &params.payment_id).await,
                (None, Some(order_id)) => api.verify(&OrderId::from(order_id), &params.payment_id).await,
                (None, None) => anyhow::bail!("Either an order id or a merchant reference is required"),
            };
            print_verification(result)?;
        },
        Command::Status { order_id } => {
            let outcome = api.payment_status(&OrderId::from(order_id)).await?;
            println!("{}", format_outcome(&outcome)?);
        },
        Command::Ledger { order_id } => {
            let entries = api.ledger_for(&OrderId::from(order_id)).await?;
            println!("{}", format_ledger(&entries));
        },
        Command::Cancel(params) => {
            let order_id = OrderId::from(params.order_id);
            let outcome = api.cancel_payment(&order_id, params.reason.as_deref()).await?;
            if let Some(payment_id) = params.payment_id {
                let portone = PortOneApi::new(config.portone.clone())?;
                let payment = portone.cancel_payment(&payment_id, params.reason.as_deref()).await?;
                println!("PortOne payment {} is now {}", payment.id, payment.status);
            }
            println!("{}", format_outcome(&outcome)?);
        },
        Command::Env | Command::Gateway { .. } => {},
    }
    Ok(())
}

/// Retryable failures are reported as an outcome rather than an error, since nothing was recorded.
fn print_verification(result: Result<VerificationOutcome, VerificationError>) -> Result<()> {
    match result {
        Ok(outcome) => println!("{}", format_outcome(&outcome)?),
        Err(e) if e.is_retryable() => {
            println!("Nothing was recorded. Try again later. {e}");
        },
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn print_gateway_payment(config: &CabConfig, payment_id: &str) -> Result<()> {
    let api = PortOneApi::new(config.portone.clone())?;
    let payment = api.get_payment(payment_id).await?;
    let json = serde_json::to_string_pretty(&payment)
        .unwrap_or_else(|e| format!("Could not represent payment as JSON. {e}"));
    println!("PortOne payment {payment_id}\n{json}");
    Ok(())
}
