use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    api::order_objects::OrderQueryFilter,
    db_types::{NewOrder, Order, OrderId, OrderStatusType},
};

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
///
/// The order status is always set to 'pending'.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, sqlx::Error> {
    let attachment = order.attachment_json();
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                account_id,
                game_id,
                product_id,
                manual_game_name,
                amount,
                currency,
                status,
                payment_method,
                comment,
                attachment
            ) VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(order.account_id)
    .bind(order.game_id)
    .bind(order.product_id)
    .bind(order.manual_game_name)
    .bind(order.amount)
    .bind(order.currency)
    .bind(order.payment_method.to_string())
    .bind(order.comment)
    .bind(attachment)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order {} inserted for {} {}", order.id, order.amount, order.currency);
    Ok(order)
}

pub async fn fetch_order(order_id: OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn set_payment_url(
    order_id: OrderId,
    url: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        "UPDATE orders SET payment_url = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
    )
    .bind(url)
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Changes the status of the order from `from` to `to`, and returns the updated order.
///
/// The update only matches if the order still has status `from`, so two concurrent callers can never both make the
/// same transition. `None` means nothing matched.
pub async fn compare_and_set_status(
    order_id: OrderId,
    from: OrderStatusType,
    to: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND status = $3
        RETURNING *
        "#,
    )
    .bind(to.to_string())
    .bind(order_id)
    .bind(from.to_string())
    .fetch_optional(conn)
    .await?;
    match &order {
        Some(_) => trace!("🗃️ Order {order_id} moved from {from} to {to}"),
        None => trace!("🗃️ Order {order_id} was not {from}. Status left unchanged"),
    }
    Ok(order)
}

/// As [`compare_and_set_status`] for the `pending` to `processing` transition, also recording the gateway's
/// transaction id. The id is only written if it has never been set.
pub async fn mark_processing_with_transaction(
    order_id: OrderId,
    transaction_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
        UPDATE orders SET status = 'processing', transaction_id = $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND status = 'pending' AND transaction_id IS NULL
        RETURNING *
        "#,
    )
    .bind(transaction_id)
    .bind(order_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in descending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM orders
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(account_id) = query.account_id {
        where_clause.push("account_id = ");
        where_clause.push_bind_unseparated(account_id);
    }
    if let Some(currency) = query.currency {
        where_clause.push("currency = ");
        where_clause.push_bind_unseparated(currency);
    }
    if let Some(method) = query.payment_method {
        where_clause.push("payment_method = ");
        where_clause.push_bind_unseparated(method.to_string());
    }
    match query.manual {
        Some(true) => {
            where_clause.push("manual_game_name IS NOT NULL");
        },
        Some(false) => {
            where_clause.push("manual_game_name IS NULL");
        },
        None => {},
    }
    if let Some(statuses) = query.status.filter(|s| !s.is_empty()) {
        // Status names come from a closed enum, so they are safe to inline.
        let status_clause = statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
        where_clause.push(format!("status IN ({status_clause})"));
    }
    if let Some(since) = query.since {
        where_clause.push("datetime(created_at) >= datetime(");
        where_clause.push_bind_unseparated(since);
        where_clause.push_unseparated(")");
    }
    if let Some(until) = query.until {
        where_clause.push("datetime(created_at) <= datetime(");
        where_clause.push_bind_unseparated(until);
        where_clause.push_unseparated(")");
    }
    builder.push(" ORDER BY created_at DESC, id DESC");
    trace!("🗃️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Order>();
    let orders = query.fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {} orders", orders.len());
    Ok(orders)
}
