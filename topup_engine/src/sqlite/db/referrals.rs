use log::debug;
use sqlx::SqliteConnection;

use crate::db_types::{NewReferralEarning, Order, OrderId, ReferralEarning};

/// Inserts the earning record. The `order_id` column is unique, so a second payout for the same order fails with a
/// unique-constraint violation, which callers should treat as "already paid".
pub async fn insert_earning(
    earning: NewReferralEarning,
    conn: &mut SqliteConnection,
) -> Result<ReferralEarning, sqlx::Error> {
    let earning: ReferralEarning = sqlx::query_as(
        r#"
        INSERT INTO referral_earnings (referrer_id, referred_account_id, order_id, amount, percentage)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(earning.referrer_id)
    .bind(earning.referred_account_id)
    .bind(earning.order_id)
    .bind(earning.amount)
    .bind(earning.percentage.to_string())
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Referral earning #{} of {} recorded for order {}", earning.id, earning.amount, earning.order_id);
    Ok(earning)
}

pub async fn earning_for_order(
    order_id: OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<ReferralEarning>, sqlx::Error> {
    let earning = sqlx::query_as("SELECT * FROM referral_earnings WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(earning)
}

pub async fn earnings_for_referrer(
    referrer_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<ReferralEarning>, sqlx::Error> {
    let earnings = sqlx::query_as("SELECT * FROM referral_earnings WHERE referrer_id = $1 ORDER BY id DESC")
        .bind(referrer_id)
        .fetch_all(conn)
        .await?;
    Ok(earnings)
}

/// The orders that earned `referrer_id` a payout, most recent payout first.
pub async fn orders_paid_out_to(referrer_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        r#"
        SELECT o.* FROM orders o
        JOIN referral_earnings e ON e.order_id = o.id
        WHERE e.referrer_id = $1
        ORDER BY e.id DESC
        "#,
    )
    .bind(referrer_id)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}
