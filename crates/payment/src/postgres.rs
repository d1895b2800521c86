use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, UserId};
use domain::{NewPayment, Payment, PaymentStatus, PaymentType};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::{PaymentError, Result};
use crate::store::PaymentStore;

const PAYMENT_COLUMNS: &str = "id, order_id, user_id, payment_no, amount, payment_type, status, trade_no, paid_at, created_at, updated_at";

/// PostgreSQL-backed payment store.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    /// Creates a new PostgreSQL payment store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        let status: String = row.try_get("status")?;
        let payment_type: String = row.try_get("payment_type")?;
        Ok(Payment {
            id: PaymentId::new(row.try_get("id")?),
            order_id: OrderId::new(row.try_get("order_id")?),
            user_id: UserId::new(row.try_get("user_id")?),
            payment_no: row.try_get("payment_no")?,
            amount: Money::from_cents(row.try_get("amount")?),
            payment_type: parse_payment_type(&payment_type)?,
            status: status.parse()?,
            trade_no: row.try_get("trade_no")?,
            paid_at: row.try_get("paid_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn payment_type_name(payment_type: PaymentType) -> &'static str {
    match payment_type {
        PaymentType::Alipay => "alipay",
        PaymentType::Wechat => "wechat",
        PaymentType::CreditCard => "credit_card",
    }
}

fn parse_payment_type(name: &str) -> Result<PaymentType> {
    match name {
        "alipay" => Ok(PaymentType::Alipay),
        "wechat" => Ok(PaymentType::Wechat),
        "credit_card" => Ok(PaymentType::CreditCard),
        other => Err(PaymentError::Store(format!("unknown payment type {other}"))),
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn insert_if_absent(&self, payment: &NewPayment) -> Result<Option<Payment>> {
        // The partial unique index on live payments per order decides races
        // between concurrent creates.
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payments (order_id, user_id, payment_no, amount, payment_type, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $6)
            ON CONFLICT (order_id) WHERE status <> 'cancelled' DO NOTHING
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment.order_id.get())
        .bind(payment.user_id.get())
        .bind(&payment.payment_no)
        .bind(payment.amount.cents())
        .bind(payment_type_name(payment.payment_type))
        .bind(payment.created_at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn find(&self, id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn find_by_no(&self, payment_no: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_no = $1"
        ))
        .bind(payment_no)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 AND status <> 'cancelled'"
        ))
        .bind(order_id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn resolve(
        &self,
        payment_no: &str,
        status: PaymentStatus,
        trade_no: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>> {
        let success = status == PaymentStatus::Success;
        let row = sqlx::query(&format!(
            r#"
            UPDATE payments
            SET status = $2,
                trade_no = CASE WHEN $3 THEN $4 ELSE trade_no END,
                paid_at = CASE WHEN $3 THEN $5 ELSE paid_at END,
                updated_at = $5
            WHERE payment_no = $1 AND status = 'pending'
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment_no)
        .bind(status.as_str())
        .bind(success)
        .bind(trade_no)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn cancel(&self, id: PaymentId, at: DateTime<Utc>) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE payments
            SET status = 'cancelled', updated_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(id.get())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }
}
