//! Mail bodies per transaction perspective

use chrono::{FixedOffset, Offset, Utc};

use crate::domain::TransactionType;

use super::dispatcher::NotificationJob;

/// Shown in place of a balance that could not be read
const MISSING_BALANCE: &str = "—";

const FALLBACK_COUNTERPART: &str = "another user";

/// Subject and HTML body of one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMail {
    pub subject: String,
    pub html_body: String,
}

/// Renders jobs into mail. Timestamps are shown in `offset`.
#[derive(Debug, Clone, Copy)]
pub struct Templates {
    offset: FixedOffset,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }
}

impl Templates {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn render(&self, job: &NotificationJob) -> RenderedMail {
        let (heading, color, intro, extra) = match job.perspective {
            TransactionType::Deposit => (
                "Deposit received",
                "#4CAF50",
                "Your deposit was processed successfully.",
                job.counterpart_name
                    .as_deref()
                    .map(|name| detail_row("From", &escape_html(name))),
            ),
            TransactionType::Withdraw => (
                "Withdrawal completed",
                "#FF9800",
                "Your withdrawal was processed successfully.",
                None,
            ),
            TransactionType::Transfer => (
                "Transfer sent",
                "#2196F3",
                "Your transfer was processed successfully.",
                Some(detail_row(
                    "Recipient",
                    &escape_html(job.counterpart_name.as_deref().unwrap_or(FALLBACK_COUNTERPART)),
                )),
            ),
        };

        let balance = job
            .resulting_balance
            .map(|balance| format!("{:.2}", balance.value()))
            .unwrap_or_else(|| MISSING_BALANCE.to_string());
        let timestamp = job
            .created_at
            .with_timezone(&self.offset)
            .format("%d/%m/%Y %H:%M:%S");

        let mut rows = vec![
            detail_row("Transaction ID", &job.transaction_id.to_string()),
            detail_row("Amount", &job.amount.to_string()),
        ];
        rows.extend(extra);
        rows.push(detail_row("New balance", &balance));
        rows.push(detail_row("Date", &timestamp.to_string()));

        let html_body = format!(
            r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2 style="color: {color};">{heading}</h2>
  <p>Hello, <strong>{name}</strong>!</p>
  <p>{intro}</p>
  <div style="background-color: #f5f5f5; padding: 15px; border-radius: 5px; margin: 20px 0;">
{rows}
  </div>
  <p style="color: #666; font-size: 12px;">If you do not recognize this transaction, contact us immediately.</p>
</div>
"#,
            name = escape_html(&job.recipient_name),
            rows = rows.join("\n"),
        );

        RenderedMail {
            subject: format!("Transaction {}", job.perspective),
            html_body,
        }
    }
}

fn detail_row(label: &str, value: &str) -> String {
    format!("    <p><strong>{label}:</strong> {value}</p>")
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
