use rust_decimal::Decimal;

#[derive(sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub password: String,
}

/// A budget category owned by one account. Amounts stay exact `NUMERIC`
/// values until the API boundary converts them for display.
#[derive(sqlx::FromRow)]
pub struct BudgetEntry {
    pub id: i64,
    pub name: String,
    pub amount: Decimal,
}

/// A dated expense attributed to one budget category. `budget` is checked
/// against the caller's categories at insert time only; deleting the
/// category later leaves the expense in place.
#[derive(sqlx::FromRow)]
pub struct ExpenseEntry {
    pub id: i64,
    pub name: String,
    pub amount: Decimal,
    pub budget: i64,
    pub date: String,
}
