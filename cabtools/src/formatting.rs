use std::fmt::Write;

use anyhow::Result;
use cab_payment_engine::{
    db_types::{PaymentRecord, Transaction},
    VerificationOutcome,
};
use prettytable::{
    format::{LinePosition, LineSeparator, TableFormat},
    row,
    Table,
};

fn markdown_format() -> TableFormat {
    prettytable::format::FormatBuilder::new()
        .column_separator('|')
        .borders('|')
        .separator(LinePosition::Title, LineSeparator::new('-', '|', '|', '|'))
        .padding(1, 1)
        .build()
}

pub fn format_outcome(outcome: &VerificationOutcome) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "Order            : {}", outcome.order_id)?;
    writeln!(f, "Status           : {}", outcome.status)?;
    writeln!(f, "Gateway payment  : {}", outcome.gateway_payment_id.as_deref().unwrap_or("-"))?;
    writeln!(f, "Amount           : {} {}", outcome.amount, outcome.currency)?;
    let verified_at = outcome.verified_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into());
    writeln!(f, "Verified at      : {verified_at}")?;
    Ok(f)
}

pub fn format_record(record: &PaymentRecord) -> Result<String> {
    let mut f = String::new();
    writeln!(f, "Order              : {}", record.order_id)?;
    writeln!(f, "Merchant reference : {}", record.merchant_reference)?;
    writeln!(f, "Amount             : {} {}", record.amount, record.currency)?;
    writeln!(f, "Payment method     : {}", record.payment_method)?;
    writeln!(f, "Status             : {}", record.status)?;
    if let Some(paid_at) = record.paid_at {
        writeln!(f, "Paid at            : {}", paid_at.to_rfc3339())?;
    }
    writeln!(f, "Created at         : {}", record.created_at)?;
    Ok(f)
}

pub fn format_ledger(entries: &[Transaction]) -> String {
    if entries.is_empty() {
        return "No ledger entries".to_string();
    }
    let mut table = Table::new();
    table.set_format(markdown_format());
    table.set_titles(row!["ID", "Type", "Entity", "Gateway payment", "Amount", "Currency", "Created At"]);
    entries.iter().for_each(|tx| {
        table.add_row(row![
            tx.transaction_id,
            tx.transaction_type.to_string(),
            format!("{} {}", tx.related_entity_type, tx.related_entity_id),
            tx.gateway_payment_id.as_deref().unwrap_or_default(),
            r->tx.amount.to_string(),
            tx.currency,
            tx.created_at.to_string()
        ]);
    });
    table.to_string()
}
