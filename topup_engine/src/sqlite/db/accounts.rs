use log::{debug, trace};
use sqlx::SqliteConnection;
use topup_common::Money;

use crate::db_types::{Account, NewAccount};

pub async fn insert_account(account: NewAccount, conn: &mut SqliteConnection) -> Result<Account, sqlx::Error> {
    let account: Account = sqlx::query_as("INSERT INTO accounts (username, email) VALUES ($1, $2) RETURNING *")
        .bind(account.username)
        .bind(account.email)
        .fetch_one(conn)
        .await?;
    debug!("🗃️ Account #{} created", account.id);
    Ok(account)
}

pub async fn account_by_id(account_id: i64, conn: &mut SqliteConnection) -> Result<Option<Account>, sqlx::Error> {
    let account = sqlx::query_as("SELECT * FROM accounts WHERE id = $1").bind(account_id).fetch_optional(conn).await?;
    Ok(account)
}

pub async fn account_by_referral_code(code: &str, conn: &mut SqliteConnection) -> Result<Option<Account>, sqlx::Error> {
    let account = sqlx::query_as("SELECT * FROM accounts WHERE referral_code = $1")
        .bind(code)
        .fetch_optional(conn)
        .await?;
    Ok(account)
}

/// Adds `amount` to the account balance in the database. Returns `false` if the account does not exist.
///
/// The increment happens inside the `UPDATE`, so concurrent credits to the same account never overwrite each
/// other. Embed the call in a transaction together with the write that justifies the credit.
pub async fn credit_balance(account_id: i64, amount: Money, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE accounts SET balance = balance + $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2",
    )
    .bind(amount)
    .bind(account_id)
    .execute(conn)
    .await?;
    trace!("🗃️ Credited {amount} to account #{account_id}");
    Ok(result.rows_affected() == 1)
}

/// Credits a referral payout to both the balance and the lifetime earnings total of the referrer.
pub async fn credit_referral_earning(
    referrer_id: i64,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE accounts SET
            balance = balance + $1,
            referral_earnings = referral_earnings + $1,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = $2
        "#,
    )
    .bind(amount)
    .bind(referrer_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Sets the referral code, unless the account already has one.
pub async fn set_referral_code_if_empty(
    account_id: i64,
    code: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE accounts SET referral_code = $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND referral_code IS NULL"#,
    )
    .bind(code)
    .bind(account_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Links the account to its referrer, unless it already has one.
pub async fn set_referrer_if_empty(
    account_id: i64,
    referrer_id: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE accounts SET referred_by = $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND referred_by IS NULL"#,
    )
    .bind(referrer_id)
    .bind(account_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn incr_total_referrals(referrer_id: i64, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE accounts SET total_referrals = total_referrals + 1 WHERE id = $1")
        .bind(referrer_id)
        .execute(conn)
        .await?;
    Ok(())
}
