use std::time::Duration;

use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgPoolOptions, postgres::PgQueryResult};

use crate::domain::{Account, BudgetEntry, ExpenseEntry};

pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    idle_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(idle_timeout)
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub async fn query_account_by_username(
    pool: &PgPool,
    username: &str,
) -> Result<Option<Account>, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        "
            SELECT id, username, password FROM users
                WHERE username = $1
        ",
    )
    .bind(username)
    .fetch_optional(pool)
    .await
}

pub async fn insert_account(
    pool: &PgPool,
    username: &str,
    password_hash: &str,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "
            INSERT INTO users (username, password)
            VALUES ($1, $2)
            RETURNING id
        ",
    )
    .bind(username)
    .bind(password_hash)
    .fetch_one(pool)
    .await
    .inspect_err(|err| {
        tracing::error!("Failed to insert account username={}: {}", username, err);
    })?;

    Ok(row.get::<i64, _>("id"))
}

pub async fn query_budget_entries(
    pool: &PgPool,
    account_id: i64,
) -> Result<Vec<BudgetEntry>, sqlx::Error> {
    sqlx::query_as::<_, BudgetEntry>(
        "
            SELECT id, name, amount FROM budget
                WHERE account = $1
                ORDER BY id
        ",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await
}

pub async fn insert_budget_entry(
    pool: &PgPool,
    account_id: i64,
    name: &str,
    amount: Decimal,
) -> Result<PgQueryResult, sqlx::Error> {
    sqlx::query(
        "
            INSERT INTO budget (account, name, amount)
            VALUES ($1, $2, $3)
        ",
    )
    .bind(account_id)
    .bind(name)
    .bind(amount)
    .execute(pool)
    .await
    .inspect_err(|err| {
        tracing::error!(
            "Failed to insert budget entry for account_id={}: {}",
            account_id,
            err
        );
    })
}

/// Deletes are scoped to the owning account; ids owned by somebody else are
/// silently left alone.
pub async fn delete_budget_entries(
    pool: &PgPool,
    account_id: i64,
    entries: &Vec<i64>,
) -> Result<PgQueryResult, sqlx::Error> {
    sqlx::query(
        "
            DELETE FROM budget
                WHERE id = ANY($1) AND account = $2
        ",
    )
    .bind(entries)
    .bind(account_id)
    .execute(pool)
    .await
}

pub async fn budget_entry_exists(
    pool: &PgPool,
    account_id: i64,
    budget_id: i64,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        "
            SELECT id FROM budget
                WHERE account = $1 AND id = $2
        ",
    )
    .bind(account_id)
    .bind(budget_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

pub async fn query_expense_entries(
    pool: &PgPool,
    account_id: i64,
) -> Result<Vec<ExpenseEntry>, sqlx::Error> {
    sqlx::query_as::<_, ExpenseEntry>(
        "
            SELECT id, name, amount, budget, date FROM expense
                WHERE account = $1
                ORDER BY id
        ",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await
}

pub async fn insert_expense_entry(
    pool: &PgPool,
    account_id: i64,
    name: &str,
    amount: Decimal,
    budget_id: i64,
    date: &str,
) -> Result<PgQueryResult, sqlx::Error> {
    sqlx::query(
        "
            INSERT INTO expense (account, name, amount, budget, date)
            VALUES ($1, $2, $3, $4, $5)
        ",
    )
    .bind(account_id)
    .bind(name)
    .bind(amount)
    .bind(budget_id)
    .bind(date)
    .execute(pool)
    .await
    .inspect_err(|err| {
        tracing::error!(
            "Failed to insert expense entry for account_id={}: {}",
            account_id,
            err
        );
    })
}

pub async fn delete_expense_entries(
    pool: &PgPool,
    account_id: i64,
    entries: &Vec<i64>,
) -> Result<PgQueryResult, sqlx::Error> {
    sqlx::query(
        "
            DELETE FROM expense
                WHERE id = ANY($1) AND account = $2
        ",
    )
    .bind(entries)
    .bind(account_id)
    .execute(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "./migrations")]
    async fn test_delete_budget_entries_scoped_to_account(pool: PgPool) {
        let alice = insert_account(&pool, "alice", "hash").await.unwrap();
        let mallory = insert_account(&pool, "mallory", "hash").await.unwrap();
        insert_budget_entry(&pool, alice, "Groceries", Decimal::new(300, 0))
            .await
            .unwrap();
        let id = query_budget_entries(&pool, alice).await.unwrap()[0].id;

        // Another account deleting this id is a silent no-op.
        delete_budget_entries(&pool, mallory, &vec![id]).await.unwrap();
        assert_eq!(query_budget_entries(&pool, alice).await.unwrap().len(), 1);

        delete_budget_entries(&pool, alice, &vec![id]).await.unwrap();
        assert!(query_budget_entries(&pool, alice).await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_delete_expense_entries_scoped_to_account(pool: PgPool) {
        let alice = insert_account(&pool, "alice", "hash").await.unwrap();
        let mallory = insert_account(&pool, "mallory", "hash").await.unwrap();
        insert_budget_entry(&pool, alice, "Groceries", Decimal::new(300, 0))
            .await
            .unwrap();
        let budget_id = query_budget_entries(&pool, alice).await.unwrap()[0].id;
        insert_expense_entry(&pool, alice, "Milk", Decimal::new(450, 2), budget_id, "2024-01-05")
            .await
            .unwrap();
        let id = query_expense_entries(&pool, alice).await.unwrap()[0].id;

        delete_expense_entries(&pool, mallory, &vec![id]).await.unwrap();
        assert_eq!(query_expense_entries(&pool, alice).await.unwrap().len(), 1);

        delete_expense_entries(&pool, alice, &vec![id]).await.unwrap();
        assert!(query_expense_entries(&pool, alice).await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_budget_entry_exists_scoped_to_owner(pool: PgPool) {
        let alice = insert_account(&pool, "alice", "hash").await.unwrap();
        let mallory = insert_account(&pool, "mallory", "hash").await.unwrap();
        insert_budget_entry(&pool, alice, "Groceries", Decimal::new(300, 0))
            .await
            .unwrap();
        let id = query_budget_entries(&pool, alice).await.unwrap()[0].id;

        assert!(budget_entry_exists(&pool, alice, id).await.unwrap());
        assert!(!budget_entry_exists(&pool, mallory, id).await.unwrap());
        assert!(!budget_entry_exists(&pool, alice, id + 1).await.unwrap());
    }

    // Deleting a category leaves its expenses in place; ownership of the
    // referenced category is only checked at insert time.
    #[sqlx::test(migrations = "./migrations")]
    async fn test_budget_delete_leaves_expenses(pool: PgPool) {
        let alice = insert_account(&pool, "alice", "hash").await.unwrap();
        insert_budget_entry(&pool, alice, "Groceries", Decimal::new(300, 0))
            .await
            .unwrap();
        let budget_id = query_budget_entries(&pool, alice).await.unwrap()[0].id;
        insert_expense_entry(&pool, alice, "Milk", Decimal::new(450, 2), budget_id, "2024-01-05")
            .await
            .unwrap();

        delete_budget_entries(&pool, alice, &vec![budget_id]).await.unwrap();

        assert!(query_budget_entries(&pool, alice).await.unwrap().is_empty());
        let expenses = query_expense_entries(&pool, alice).await.unwrap();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].budget, budget_id);
    }
}
