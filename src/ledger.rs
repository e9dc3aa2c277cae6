//! Inventory ledger: products, customers, sales and payments.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::{info, warn};

use crate::db::finish_tx;
use crate::model::{Customer, PaymentLog, PaymentStatus, Product, Transaction, TransactionItem};
use crate::reconcile::{self, SoldQuantity};
use crate::time::now_ms;
use crate::{AppError, AppResult};

/// Amounts closer than this are treated as equal.
const MONEY_EPSILON: f64 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SaleError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("quantity for product {product_id} must be positive (got {quantity})")]
    InvalidQuantity { product_id: i64, quantity: i64 },
    #[error("unit price for product {product_id} must be a non-negative number")]
    InvalidPrice { product_id: i64 },
    #[error("product {0} does not exist")]
    UnknownProduct(i64),
    #[error("customer {0} does not exist")]
    UnknownCustomer(i64),
    #[error("not enough stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i64,
        available: i64,
    },
}

impl From<SaleError> for AppError {
    fn from(err: SaleError) -> Self {
        let message = err.to_string();
        match err {
            SaleError::EmptyCart => AppError::validation("EMPTY_CART", message),
            SaleError::InvalidQuantity {
                product_id,
                quantity,
            } => AppError::validation("INVALID_QUANTITY", message)
                .with_context("product_id", product_id.to_string())
                .with_context("quantity", quantity.to_string()),
            SaleError::InvalidPrice { product_id } => AppError::validation("INVALID_PRICE", message)
                .with_context("product_id", product_id.to_string()),
            SaleError::UnknownProduct(id) => AppError::validation("UNKNOWN_PRODUCT", message)
                .with_context("product_id", id.to_string()),
            SaleError::UnknownCustomer(id) => AppError::validation("UNKNOWN_CUSTOMER", message)
                .with_context("customer_id", id.to_string()),
            SaleError::InsufficientStock {
                product_id,
                requested,
                available,
            } => AppError::validation("INSUFFICIENT_STOCK", message)
                .with_context("product_id", product_id.to_string())
                .with_context("requested", requested.to_string())
                .with_context("available", available.to_string()),
        }
    }
}

fn missing(field: &'static str, what: &str) -> AppError {
    AppError::validation("MISSING_FIELD", format!("{what} is required")).with_context("field", field)
}

fn check_money(field: &'static str, value: f64) -> AppResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::validation(
            "INVALID_AMOUNT",
            format!("{field} must be a non-negative number"),
        )
        .with_context("field", field)
        .with_context("value", value.to_string()));
    }
    Ok(())
}

fn check_count(field: &'static str, value: i64) -> AppResult<()> {
    if value < 0 {
        return Err(AppError::validation(
            "INVALID_QUANTITY",
            format!("{field} must not be negative"),
        )
        .with_context("field", field)
        .with_context("value", value.to_string()));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub barcode: Option<String>,
    pub category: Option<String>,
    pub buy_price: f64,
    pub sell_price: f64,
    pub quantity: i64,
    pub min_stock: i64,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, sell_price: f64) -> Self {
        Self {
            name: name.into(),
            barcode: None,
            category: None,
            buy_price: 0.0,
            sell_price,
            quantity: 0,
            min_stock: 0,
        }
    }

    pub fn quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn buy_price(mut self, buy_price: f64) -> Self {
        self.buy_price = buy_price;
        self
    }

    pub fn min_stock(mut self, min_stock: i64) -> Self {
        self.min_stock = min_stock;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }

    fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(missing("name", "Product name"));
        }
        check_money("buy_price", self.buy_price)?;
        check_money("sell_price", self.sell_price)?;
        check_count("quantity", self.quantity)?;
        check_count("min_stock", self.min_stock)
    }
}

/// `None` leaves a field untouched; `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub barcode: Option<Option<String>>,
    pub category: Option<Option<String>>,
    pub buy_price: Option<f64>,
    pub sell_price: Option<f64>,
    pub quantity: Option<i64>,
    pub min_stock: Option<i64>,
}

pub(crate) async fn fetch_product(conn: &mut SqliteConnection, id: i64) -> AppResult<Product> {
    let sql = format!("SELECT {} FROM products WHERE id = ?", Product::COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("product", id))?;
    Product::from_row(&row)
}

/// Insert without opening a transaction; the caller owns atomicity.
pub(crate) async fn insert_product(conn: &mut SqliteConnection, new: &NewProduct) -> AppResult<i64> {
    new.validate()?;
    let id = sqlx::query(
        "INSERT INTO products
           (name, barcode, category, buy_price, sell_price, quantity, min_stock, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(new.name.trim())
    .bind(non_blank(new.barcode.clone()))
    .bind(non_blank(new.category.clone()))
    .bind(new.buy_price)
    .bind(new.sell_price)
    .bind(new.quantity)
    .bind(new.min_stock)
    .bind(now_ms())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

pub async fn create_product(pool: &SqlitePool, new: &NewProduct) -> AppResult<Product> {
    let mut conn = pool.acquire().await?;
    let id = insert_product(&mut conn, new).await?;
    info!(target: "shelfkeeper", event = "product_created", product_id = id);
    fetch_product(&mut conn, id).await
}

pub async fn get_product(pool: &SqlitePool, id: i64) -> AppResult<Product> {
    let mut conn = pool.acquire().await?;
    fetch_product(&mut conn, id).await
}

pub async fn list_products(pool: &SqlitePool) -> AppResult<Vec<Product>> {
    let sql = format!(
        "SELECT {} FROM products ORDER BY name COLLATE NOCASE, id",
        Product::COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(Product::from_row).collect()
}

pub async fn find_product_by_barcode(pool: &SqlitePool, barcode: &str) -> AppResult<Option<Product>> {
    let sql = format!(
        "SELECT {} FROM products WHERE barcode = ? ORDER BY id LIMIT 1",
        Product::COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(barcode.trim())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(Product::from_row).transpose()
}

/// Products at or below their minimum stock level.
pub async fn low_stock_products(pool: &SqlitePool) -> AppResult<Vec<Product>> {
    let sql = format!(
        "SELECT {} FROM products WHERE quantity <= min_stock ORDER BY quantity, name COLLATE NOCASE",
        Product::COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(Product::from_row).collect()
}

pub async fn update_product(pool: &SqlitePool, id: i64, update: &UpdateProduct) -> AppResult<Product> {
    let mut conn = pool.acquire().await?;
    let current = fetch_product(&mut conn, id).await?;
    let next = NewProduct {
        name: update.name.clone().unwrap_or(current.name),
        barcode: update.barcode.clone().unwrap_or(current.barcode),
        category: update.category.clone().unwrap_or(current.category),
        buy_price: update.buy_price.unwrap_or(current.buy_price),
        sell_price: update.sell_price.unwrap_or(current.sell_price),
        quantity: update.quantity.unwrap_or(current.quantity),
        min_stock: update.min_stock.unwrap_or(current.min_stock),
    };
    next.validate()?;

    sqlx::query(
        "UPDATE products
            SET name = ?, barcode = ?, category = ?, buy_price = ?, sell_price = ?,
                quantity = ?, min_stock = ?
          WHERE id = ?",
    )
    .bind(next.name.trim())
    .bind(non_blank(next.barcode))
    .bind(non_blank(next.category))
    .bind(next.buy_price)
    .bind(next.sell_price)
    .bind(next.quantity)
    .bind(next.min_stock)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    fetch_product(&mut conn, id).await
}

/// Delete a product. List items pointing at it are unlinked; a product that
/// appears in sale history is kept.
pub async fn delete_product(pool: &SqlitePool, id: i64) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    let result: AppResult<()> = async {
        fetch_product(&mut tx, id).await?;
        let sold: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM transaction_items WHERE product_id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if sold > 0 {
            return Err(AppError::integrity(
                "PRODUCT_IN_HISTORY",
                "Product appears in recorded sales and cannot be deleted",
            )
            .with_context("product_id", id.to_string())
            .with_context("sale_lines", sold.to_string()));
        }
        let unlinked = sqlx::query("UPDATE shopping_list_items SET product_id = NULL WHERE product_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        info!(
            target: "shelfkeeper",
            event = "product_deleted",
            product_id = id,
            list_items_unlinked = unlinked
        );
        Ok(())
    }
    .await;
    finish_tx(tx, result).await
}

// ---------------------------------------------------------------------------
// Customers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer {
    pub name: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
}

impl NewCustomer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomer {
    pub name: Option<String>,
    pub phone: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

async fn fetch_customer(conn: &mut SqliteConnection, id: i64) -> AppResult<Customer> {
    let row = sqlx::query("SELECT id, name, phone, notes, created_at FROM customers WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("customer", id))?;
    Customer::from_row(&row)
}

pub async fn create_customer(pool: &SqlitePool, new: &NewCustomer) -> AppResult<Customer> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(missing("name", "Customer name"));
    }
    let mut conn = pool.acquire().await?;
    let id = sqlx::query("INSERT INTO customers (name, phone, notes, created_at) VALUES (?, ?, ?, ?)")
        .bind(name)
        .bind(non_blank(new.phone.clone()))
        .bind(non_blank(new.notes.clone()))
        .bind(now_ms())
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();
    fetch_customer(&mut conn, id).await
}

pub async fn get_customer(pool: &SqlitePool, id: i64) -> AppResult<Customer> {
    let mut conn = pool.acquire().await?;
    fetch_customer(&mut conn, id).await
}

pub async fn list_customers(pool: &SqlitePool) -> AppResult<Vec<Customer>> {
    let rows = sqlx::query(
        "SELECT id, name, phone, notes, created_at FROM customers ORDER BY name COLLATE NOCASE, id",
    )
    .fetch_all(pool)
    .await?;
    rows.iter().map(Customer::from_row).collect()
}

pub async fn update_customer(
    pool: &SqlitePool,
    id: i64,
    update: &UpdateCustomer,
) -> AppResult<Customer> {
    let mut conn = pool.acquire().await?;
    let mut customer = fetch_customer(&mut conn, id).await?;
    if let Some(name) = &update.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(missing("name", "Customer name"));
        }
        customer.name = name.to_string();
    }
    if let Some(phone) = &update.phone {
        customer.phone = non_blank(phone.clone());
    }
    if let Some(notes) = &update.notes {
        customer.notes = non_blank(notes.clone());
    }
    sqlx::query("UPDATE customers SET name = ?, phone = ?, notes = ? WHERE id = ?")
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(&customer.notes)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(customer)
}

/// Delete a customer after detaching their lists and transactions.
pub async fn delete_customer(pool: &SqlitePool, id: i64) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    let result: AppResult<()> = async {
        fetch_customer(&mut tx, id).await?;
        let lists = sqlx::query("UPDATE shopping_lists SET customer_id = NULL WHERE customer_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let sales = sqlx::query("UPDATE transactions SET customer_id = NULL WHERE customer_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM customers WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        info!(
            target: "shelfkeeper",
            event = "customer_deleted",
            customer_id = id,
            lists_detached = lists,
            transactions_detached = sales
        );
        Ok(())
    }
    .await;
    finish_tx(tx, result).await
}

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    pub product_id: i64,
    pub quantity: i64,
    /// Defaults to the product's sell price.
    pub unit_price: Option<f64>,
}

impl SaleLine {
    pub fn new(product_id: i64, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            unit_price: None,
        }
    }

    pub fn at(mut self, unit_price: f64) -> Self {
        self.unit_price = Some(unit_price);
        self
    }
}

struct PricedLine {
    product_id: i64,
    quantity: i64,
    unit_price: f64,
}

/// Reject the cart before anything is written. Products listed on several
/// lines are checked against their combined quantity.
async fn price_lines(conn: &mut SqliteConnection, lines: &[SaleLine]) -> AppResult<Vec<PricedLine>> {
    if lines.is_empty() {
        return Err(SaleError::EmptyCart.into());
    }

    let mut stock: HashMap<i64, Product> = HashMap::new();
    let mut requested: HashMap<i64, i64> = HashMap::new();
    let mut priced = Vec::with_capacity(lines.len());

    for line in lines {
        if line.quantity <= 0 {
            return Err(SaleError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            }
            .into());
        }
        if !stock.contains_key(&line.product_id) {
            let product = match fetch_product(conn, line.product_id).await {
                Ok(p) => p,
                Err(e) if e.code() == "APP/NOT_FOUND" => {
                    return Err(SaleError::UnknownProduct(line.product_id).into())
                }
                Err(e) => return Err(e),
            };
            stock.insert(line.product_id, product);
        }
        let product = &stock[&line.product_id];

        let unit_price = line.unit_price.unwrap_or(product.sell_price);
        if !unit_price.is_finite() || unit_price < 0.0 {
            return Err(SaleError::InvalidPrice {
                product_id: line.product_id,
            }
            .into());
        }

        let total = requested.entry(line.product_id).or_insert(0);
        match total.checked_add(line.quantity) {
            Some(sum) if sum <= product.quantity => *total = sum,
            sum => {
                return Err(SaleError::InsufficientStock {
                    product_id: line.product_id,
                    requested: sum.unwrap_or(i64::MAX),
                    available: product.quantity,
                }
                .into())
            }
        }

        priced.push(PricedLine {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price,
        });
    }
    Ok(priced)
}

async fn complete_sale_in(
    conn: &mut SqliteConnection,
    customer_id: Option<i64>,
    status: PaymentStatus,
    lines: &[SaleLine],
) -> AppResult<i64> {
    if let Some(cid) = customer_id {
        let known: Option<i64> = sqlx::query_scalar("SELECT id FROM customers WHERE id = ?")
            .bind(cid)
            .fetch_optional(&mut *conn)
            .await?;
        if known.is_none() {
            return Err(SaleError::UnknownCustomer(cid).into());
        }
    }

    let priced = price_lines(conn, lines).await?;
    let total: f64 = priced.iter().map(|l| l.quantity as f64 * l.unit_price).sum();
    let paid = match status {
        PaymentStatus::FullyPaid => total,
        PaymentStatus::Debt => 0.0,
    };
    let now = now_ms();

    let tx_id = sqlx::query(
        "INSERT INTO transactions (date, customer_id, total_amount, payment_status, paid_amount)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(now)
    .bind(customer_id)
    .bind(total)
    .bind(PaymentStatus::derive(total, paid).as_str())
    .bind(paid)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    let mut sold = Vec::with_capacity(priced.len());
    for line in &priced {
        sqlx::query(
            "INSERT INTO transaction_items (transaction_id, product_id, quantity, unit_price, line_total)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(tx_id)
        .bind(line.product_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.quantity as f64 * line.unit_price)
        .execute(&mut *conn)
        .await?;

        let res = sqlx::query(
            "UPDATE products SET quantity = quantity - ?1 WHERE id = ?2 AND quantity >= ?1",
        )
        .bind(line.quantity)
        .bind(line.product_id)
        .execute(&mut *conn)
        .await?;
        if res.rows_affected() == 0 {
            let available: i64 = sqlx::query_scalar("SELECT quantity FROM products WHERE id = ?")
                .bind(line.product_id)
                .fetch_optional(&mut *conn)
                .await?
                .unwrap_or(0);
            return Err(SaleError::InsufficientStock {
                product_id: line.product_id,
                requested: line.quantity,
                available,
            }
            .into());
        }
        sold.push(SoldQuantity {
            product_id: line.product_id,
            quantity: line.quantity,
        });
    }

    if paid > 0.0 {
        sqlx::query(
            "INSERT INTO payment_logs (transaction_id, amount, note, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(tx_id)
        .bind(paid)
        .bind("Paid at sale")
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }

    reconcile::add_sold_quantities_in(conn, &sold).await?;
    Ok(tx_id)
}

/// Record a sale. Validation, stock decrement, payment log and the monthly
/// restock accumulator all commit together or not at all.
pub async fn complete_sale(
    pool: &SqlitePool,
    customer_id: Option<i64>,
    status: PaymentStatus,
    lines: &[SaleLine],
) -> AppResult<Transaction> {
    let mut tx = pool.begin().await?;
    let result = complete_sale_in(&mut tx, customer_id, status, lines).await;
    let tx_id = finish_tx(tx, result).await.map_err(|e| {
        if e.is_validation() {
            warn!(target: "shelfkeeper", event = "sale_rejected", code = %e.code());
        }
        e
    })?;
    let sale = get_transaction(pool, tx_id).await?;
    info!(
        target: "shelfkeeper",
        event = "sale_completed",
        transaction_id = tx_id,
        lines = lines.len(),
        total = sale.total_amount,
        status = %sale.payment_status
    );
    Ok(sale)
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

async fn fetch_transaction(conn: &mut SqliteConnection, id: i64) -> AppResult<Transaction> {
    let sql = format!("SELECT {} FROM transactions WHERE id = ?", Transaction::COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("transaction", id))?;
    Transaction::from_row(&row)
}

pub async fn get_transaction(pool: &SqlitePool, id: i64) -> AppResult<Transaction> {
    let mut conn = pool.acquire().await?;
    fetch_transaction(&mut conn, id).await
}

/// Amount still owed on a sale; never negative.
pub async fn outstanding(pool: &SqlitePool, transaction_id: i64) -> AppResult<f64> {
    Ok(get_transaction(pool, transaction_id).await?.outstanding())
}

/// Apply a (partial) payment against a sale and append it to the payment log.
pub async fn log_payment(
    pool: &SqlitePool,
    transaction_id: i64,
    amount: f64,
    note: Option<&str>,
) -> AppResult<Transaction> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::validation("INVALID_AMOUNT", "Payment must be a positive amount")
            .with_context("amount", amount.to_string()));
    }

    let note = non_blank(note.map(str::to_string));
    let mut tx = pool.begin().await?;
    let result: AppResult<Transaction> = async {
        let mut sale = fetch_transaction(&mut tx, transaction_id).await?;
        let owed = sale.outstanding();
        if amount > owed + MONEY_EPSILON {
            return Err(AppError::validation(
                "OVERPAYMENT",
                format!("Payment of {amount:.2} exceeds the outstanding {owed:.2}"),
            )
            .with_context("transaction_id", transaction_id.to_string())
            .with_context("outstanding", owed.to_string()));
        }

        sale.paid_amount = (sale.paid_amount + amount).min(sale.total_amount);
        if sale.total_amount - sale.paid_amount < MONEY_EPSILON {
            sale.paid_amount = sale.total_amount;
        }
        sale.payment_status = PaymentStatus::derive(sale.total_amount, sale.paid_amount);

        sqlx::query("UPDATE transactions SET paid_amount = ?, payment_status = ? WHERE id = ?")
            .bind(sale.paid_amount)
            .bind(sale.payment_status.as_str())
            .bind(transaction_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO payment_logs (transaction_id, amount, note, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(transaction_id)
        .bind(amount)
        .bind(&note)
        .bind(now_ms())
        .execute(&mut *tx)
        .await?;
        Ok(sale)
    }
    .await;

    let sale = finish_tx(tx, result).await?;
    info!(
        target: "shelfkeeper",
        event = "payment_logged",
        transaction_id = transaction_id,
        amount = amount,
        outstanding = sale.outstanding()
    );
    Ok(sale)
}

pub async fn payment_logs(pool: &SqlitePool, transaction_id: i64) -> AppResult<Vec<PaymentLog>> {
    let rows = sqlx::query(
        "SELECT id, transaction_id, amount, note, created_at
           FROM payment_logs WHERE transaction_id = ? ORDER BY created_at, id",
    )
    .bind(transaction_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(PaymentLog::from_row).collect()
}

// ---------------------------------------------------------------------------
// Read models for export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilter {
    pub customer_id: Option<i64>,
    pub debt_only: bool,
}

/// Sales newest first.
pub async fn list_transactions(
    pool: &SqlitePool,
    filter: TransactionFilter,
) -> AppResult<Vec<Transaction>> {
    let mut sql = format!("SELECT {} FROM transactions WHERE 1 = 1", Transaction::COLUMNS);
    if filter.customer_id.is_some() {
        sql.push_str(" AND customer_id = ?");
    }
    if filter.debt_only {
        sql.push_str(" AND paid_amount < total_amount");
    }
    sql.push_str(" ORDER BY date DESC, id DESC");

    let mut query = sqlx::query(&sql);
    if let Some(cid) = filter.customer_id {
        query = query.bind(cid);
    }
    let rows = query.fetch_all(pool).await?;
    rows.iter().map(Transaction::from_row).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetails {
    pub transaction: Transaction,
    pub items: Vec<TransactionItem>,
    pub payments: Vec<PaymentLog>,
}

pub async fn transaction_details(pool: &SqlitePool, transaction_id: i64) -> AppResult<TransactionDetails> {
    let transaction = get_transaction(pool, transaction_id).await?;
    let rows = sqlx::query(
        "SELECT id, transaction_id, product_id, quantity, unit_price, line_total
           FROM transaction_items WHERE transaction_id = ? ORDER BY id",
    )
    .bind(transaction_id)
    .fetch_all(pool)
    .await?;
    let items = rows
        .iter()
        .map(TransactionItem::from_row)
        .collect::<AppResult<Vec<_>>>()?;
    let payments = payment_logs(pool, transaction_id).await?;
    Ok(TransactionDetails {
        transaction,
        items,
        payments,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerDebt {
    /// `None` groups walk-in sales and sales of deleted customers.
    pub customer_id: Option<i64>,
    pub customer_name: Option<String>,
    pub open_transactions: i64,
    pub outstanding: f64,
}

/// Outstanding debt grouped per customer, largest first.
pub async fn debt_summary(pool: &SqlitePool) -> AppResult<Vec<CustomerDebt>> {
    let rows = sqlx::query(
        "SELECT t.customer_id AS customer_id,
                c.name AS customer_name,
                COUNT(*) AS open_transactions,
                SUM(t.total_amount - t.paid_amount) AS outstanding
           FROM transactions t
           LEFT JOIN customers c ON c.id = t.customer_id
          WHERE t.paid_amount < t.total_amount
          GROUP BY t.customer_id
          ORDER BY outstanding DESC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> AppResult<CustomerDebt> {
            Ok(CustomerDebt {
                customer_id: row.try_get("customer_id")?,
                customer_name: row.try_get("customer_name")?,
                open_transactions: row.try_get("open_transactions")?,
                outstanding: row.try_get("outstanding")?,
            })
        })
        .collect()
}
