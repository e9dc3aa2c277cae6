//! Shopping lists and their reconciliation into depot stock.
//!
//! A list item is *pending* until it is transferred (or toggled) to
//! *completed*. Transfers act on pending items only, which is what makes
//! re-running a transfer harmless. The monthly restock list is a singleton
//! that accumulates whatever completed sales take off the shelves.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{finish_tx, run_in_tx};
use crate::ledger::{self, NewProduct};
use crate::model::{ListStatus, ListType, Priority, ShoppingList, ShoppingListItem};
use crate::quantity::{to_stock_units, MAX_LIST_QUANTITY};
use crate::time::now_ms;
use crate::{AppError, AppResult};

pub const MONTHLY_LIST_TITLE: &str = "Monthly restock";

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("shopping list {0} not found")]
    ListNotFound(i64),
    #[error("shopping list item {0} not found")]
    ItemNotFound(i64),
    #[error("the monthly restock list cannot be deleted")]
    MonthlyListUndeletable,
    #[error("only one monthly restock list may exist")]
    MonthlyListReserved,
    #[error("list {0} is not the monthly restock list")]
    NotMonthlyList(i64),
    #[error("transfer of list {list_id} failed; nothing was applied, re-open the list and retry")]
    Partial { list_id: i64, source: AppError },
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        let message = err.to_string();
        match err {
            ReconcileError::ListNotFound(id) => {
                AppError::new("RECONCILE/LIST_NOT_FOUND", message).with_context("list_id", id.to_string())
            }
            ReconcileError::ItemNotFound(id) => {
                AppError::new("RECONCILE/ITEM_NOT_FOUND", message).with_context("item_id", id.to_string())
            }
            ReconcileError::MonthlyListUndeletable => {
                AppError::validation("MONTHLY_LIST_UNDELETABLE", message)
            }
            ReconcileError::MonthlyListReserved => {
                AppError::validation("MONTHLY_LIST_RESERVED", message)
            }
            ReconcileError::NotMonthlyList(id) => {
                AppError::validation("NOT_MONTHLY_LIST", message).with_context("list_id", id.to_string())
            }
            ReconcileError::Partial { list_id, source } => AppError::new("RECONCILE/PARTIAL", message)
                .with_context("list_id", list_id.to_string())
                .with_cause(source),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShoppingList {
    pub title: String,
    #[serde(rename = "type")]
    pub list_type: ListType,
    pub priority: Priority,
    pub notes: Option<String>,
    pub customer_id: Option<i64>,
    pub due_date: Option<String>,
}

impl NewShoppingList {
    pub fn new(title: impl Into<String>, list_type: ListType) -> Self {
        Self {
            title: title.into(),
            list_type,
            priority: Priority::Medium,
            notes: None,
            customer_id: None,
            due_date: None,
        }
    }

    pub fn customer(mut self, customer_id: i64) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// `None` leaves a field untouched; `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShoppingList {
    pub title: Option<String>,
    pub status: Option<ListStatus>,
    pub priority: Option<Priority>,
    pub notes: Option<Option<String>>,
    pub customer_id: Option<Option<i64>>,
    pub due_date: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewListItem {
    pub product_id: Option<i64>,
    pub name: String,
    pub quantity_value: f64,
    pub quantity_label: Option<String>,
    pub estimated_unit_cost: f64,
    pub sell_price: f64,
    pub category: Option<String>,
    pub notes: Option<String>,
}

impl NewListItem {
    pub fn new(name: impl Into<String>, quantity_value: f64) -> Self {
        Self {
            product_id: None,
            name: name.into(),
            quantity_value,
            quantity_label: None,
            estimated_unit_cost: 0.0,
            sell_price: 0.0,
            category: None,
            notes: None,
        }
    }

    pub fn product(mut self, product_id: i64) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn prices(mut self, estimated_unit_cost: f64, sell_price: f64) -> Self {
        self.estimated_unit_cost = estimated_unit_cost;
        self.sell_price = sell_price;
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateListItem {
    pub product_id: Option<Option<i64>>,
    pub name: Option<String>,
    pub quantity_value: Option<f64>,
    pub quantity_label: Option<Option<String>>,
    pub estimated_unit_cost: Option<f64>,
    pub sell_price: Option<f64>,
    pub category: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

/// One sold line fed into the monthly accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoldQuantity {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSummary {
    pub products_touched: usize,
    pub quantity_moved: i64,
}

fn check_title(title: &str) -> AppResult<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("MISSING_FIELD", "List title is required")
            .with_context("field", "title"));
    }
    Ok(trimmed.to_string())
}

fn check_amount(field: &'static str, value: f64) -> AppResult<()> {
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

fn check_quantity(value: f64) -> AppResult<()> {
    check_amount("quantity_value", value)?;
    if value > MAX_LIST_QUANTITY {
        return Err(AppError::validation(
            "INVALID_AMOUNT",
            format!("quantity_value must not exceed {MAX_LIST_QUANTITY}"),
        )
        .with_context("field", "quantity_value")
        .with_context("value", value.to_string()));
    }
    Ok(())
}

fn stock_overflow(product_id: Option<i64>, units: i64) -> AppError {
    let err = AppError::validation("STOCK_OVERFLOW", "Transfer would overflow the stock counter")
        .with_context("units", units.to_string());
    match product_id {
        Some(id) => err.with_context("product_id", id.to_string()),
        None => err,
    }
}

async fn fetch_list(conn: &mut SqliteConnection, list_id: i64) -> AppResult<ShoppingList> {
    let sql = format!("SELECT {} FROM shopping_lists WHERE id = ?", ShoppingList::COLUMNS);
    let row = sqlx::query(&sql)
        .bind(list_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ReconcileError::ListNotFound(list_id))?;
    ShoppingList::from_row(&row)
}

async fn fetch_item(conn: &mut SqliteConnection, item_id: i64) -> AppResult<ShoppingListItem> {
    let sql = format!(
        "SELECT {} FROM shopping_list_items WHERE id = ?",
        ShoppingListItem::COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(item_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ReconcileError::ItemNotFound(item_id))?;
    ShoppingListItem::from_row(&row)
}

async fn items_in(
    conn: &mut SqliteConnection,
    list_id: i64,
    pending_only: bool,
) -> AppResult<Vec<ShoppingListItem>> {
    let filter = if pending_only { " AND is_completed = 0" } else { "" };
    let sql = format!(
        "SELECT {} FROM shopping_list_items WHERE list_id = ?{filter} ORDER BY id",
        ShoppingListItem::COLUMNS
    );
    let rows = sqlx::query(&sql).bind(list_id).fetch_all(&mut *conn).await?;
    rows.iter().map(ShoppingListItem::from_row).collect()
}

// ---------------------------------------------------------------------------
// Monthly restock singleton
// ---------------------------------------------------------------------------

pub(crate) async fn monthly_list_id(conn: &mut SqliteConnection) -> AppResult<Option<i64>> {
    let id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM shopping_lists WHERE type = ? ORDER BY id LIMIT 1")
            .bind(ListType::MonthlyRestock.as_str())
            .fetch_optional(&mut *conn)
            .await?;
    Ok(id)
}

pub(crate) async fn ensure_monthly_restock_list_in(conn: &mut SqliteConnection) -> AppResult<i64> {
    if let Some(id) = monthly_list_id(conn).await? {
        return Ok(id);
    }
    let id = sqlx::query(
        "INSERT INTO shopping_lists (title, type, status, priority, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(MONTHLY_LIST_TITLE)
    .bind(ListType::MonthlyRestock.as_str())
    .bind(ListStatus::Active.as_str())
    .bind(Priority::Medium.as_str())
    .bind(now_ms())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    info!(target: "shelfkeeper", event = "monthly_list_created", list_id = id);
    Ok(id)
}

/// Id of the monthly restock list, creating it on first use.
pub async fn ensure_monthly_restock_list(pool: &SqlitePool) -> AppResult<i64> {
    let mut conn = pool.acquire().await?;
    ensure_monthly_restock_list_in(&mut conn).await
}

// ---------------------------------------------------------------------------
// List CRUD
// ---------------------------------------------------------------------------

pub async fn create_list(pool: &SqlitePool, new: &NewShoppingList) -> AppResult<ShoppingList> {
    if new.list_type == ListType::MonthlyRestock {
        return Err(ReconcileError::MonthlyListReserved.into());
    }
    let title = check_title(&new.title)?;
    let mut conn = pool.acquire().await?;
    let id = sqlx::query(
        "INSERT INTO shopping_lists
           (title, type, status, priority, notes, customer_id, due_date, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&title)
    .bind(new.list_type.as_str())
    .bind(ListStatus::Active.as_str())
    .bind(new.priority.as_str())
    .bind(&new.notes)
    .bind(new.customer_id)
    .bind(&new.due_date)
    .bind(now_ms())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    fetch_list(&mut conn, id).await
}

pub async fn get_list(pool: &SqlitePool, list_id: i64) -> AppResult<ShoppingList> {
    let mut conn = pool.acquire().await?;
    fetch_list(&mut conn, list_id).await
}

/// Lists newest first; archived lists only when asked for.
pub async fn list_lists(pool: &SqlitePool, include_archived: bool) -> AppResult<Vec<ShoppingList>> {
    let filter = if include_archived {
        ""
    } else {
        " WHERE status <> 'archived'"
    };
    let sql = format!(
        "SELECT {} FROM shopping_lists{filter} ORDER BY created_at DESC, id DESC",
        ShoppingList::COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(ShoppingList::from_row).collect()
}

pub async fn update_list(
    pool: &SqlitePool,
    list_id: i64,
    update: &UpdateShoppingList,
) -> AppResult<ShoppingList> {
    let mut conn = pool.acquire().await?;
    let mut list = fetch_list(&mut conn, list_id).await?;

    if let Some(title) = &update.title {
        list.title = check_title(title)?;
    }
    if let Some(status) = update.status {
        list.status = status;
    }
    if let Some(priority) = update.priority {
        list.priority = priority;
    }
    if let Some(notes) = &update.notes {
        list.notes = notes.clone();
    }
    if let Some(customer_id) = update.customer_id {
        list.customer_id = customer_id;
    }
    if let Some(due_date) = &update.due_date {
        list.due_date = due_date.clone();
    }

    sqlx::query(
        "UPDATE shopping_lists
            SET title = ?, status = ?, priority = ?, notes = ?, customer_id = ?, due_date = ?
          WHERE id = ?",
    )
    .bind(&list.title)
    .bind(list.status.as_str())
    .bind(list.priority.as_str())
    .bind(&list.notes)
    .bind(list.customer_id)
    .bind(&list.due_date)
    .bind(list_id)
    .execute(&mut *conn)
    .await?;
    Ok(list)
}

/// Delete a list and (by cascade) its items. The monthly list is permanent.
pub async fn delete_list(pool: &SqlitePool, list_id: i64) -> AppResult<()> {
    let mut conn = pool.acquire().await?;
    let list = fetch_list(&mut conn, list_id).await?;
    if list.list_type == ListType::MonthlyRestock {
        return Err(ReconcileError::MonthlyListUndeletable.into());
    }
    sqlx::query("DELETE FROM shopping_lists WHERE id = ?")
        .bind(list_id)
        .execute(&mut *conn)
        .await?;
    info!(target: "shelfkeeper", event = "list_deleted", list_id = list_id);
    Ok(())
}

// ---------------------------------------------------------------------------
// Item CRUD
// ---------------------------------------------------------------------------

pub async fn list_items(pool: &SqlitePool, list_id: i64) -> AppResult<Vec<ShoppingListItem>> {
    let mut conn = pool.acquire().await?;
    fetch_list(&mut conn, list_id).await?;
    items_in(&mut conn, list_id, false).await
}

/// Add an item. A linked item without a name borrows the product's name.
pub async fn add_item(
    pool: &SqlitePool,
    list_id: i64,
    new: &NewListItem,
) -> AppResult<ShoppingListItem> {
    check_quantity(new.quantity_value)?;
    check_amount("estimated_unit_cost", new.estimated_unit_cost)?;
    check_amount("sell_price", new.sell_price)?;

    let mut conn = pool.acquire().await?;
    fetch_list(&mut conn, list_id).await?;

    let mut name = new.name.trim().to_string();
    if let Some(product_id) = new.product_id {
        let product = ledger::fetch_product(&mut conn, product_id).await?;
        if name.is_empty() {
            name = product.name;
        }
    }
    if name.is_empty() {
        return Err(AppError::validation("MISSING_FIELD", "Item name is required")
            .with_context("field", "name"));
    }

    let id = sqlx::query(
        "INSERT INTO shopping_list_items
           (list_id, product_id, name, quantity_value, quantity_label, estimated_unit_cost,
            sell_price, category, notes, is_completed, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(list_id)
    .bind(new.product_id)
    .bind(&name)
    .bind(new.quantity_value)
    .bind(&new.quantity_label)
    .bind(new.estimated_unit_cost)
    .bind(new.sell_price)
    .bind(&new.category)
    .bind(&new.notes)
    .bind(now_ms())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    fetch_item(&mut conn, id).await
}

pub async fn update_item(
    pool: &SqlitePool,
    item_id: i64,
    update: &UpdateListItem,
) -> AppResult<ShoppingListItem> {
    let mut conn = pool.acquire().await?;
    let mut item = fetch_item(&mut conn, item_id).await?;

    if let Some(product_id) = update.product_id {
        if let Some(pid) = product_id {
            ledger::fetch_product(&mut conn, pid).await?;
        }
        item.product_id = product_id;
    }
    if let Some(name) = &update.name {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("MISSING_FIELD", "Item name is required")
                .with_context("field", "name"));
        }
        item.name = trimmed.to_string();
    }
    if let Some(value) = update.quantity_value {
        check_quantity(value)?;
        item.quantity_value = value;
    }
    if let Some(label) = &update.quantity_label {
        item.quantity_label = label.clone();
    }
    if let Some(cost) = update.estimated_unit_cost {
        check_amount("estimated_unit_cost", cost)?;
        item.estimated_unit_cost = cost;
    }
    if let Some(price) = update.sell_price {
        check_amount("sell_price", price)?;
        item.sell_price = price;
    }
    if let Some(category) = &update.category {
        item.category = category.clone();
    }
    if let Some(notes) = &update.notes {
        item.notes = notes.clone();
    }

    sqlx::query(
        "UPDATE shopping_list_items
            SET product_id = ?, name = ?, quantity_value = ?, quantity_label = ?,
                estimated_unit_cost = ?, sell_price = ?, category = ?, notes = ?
          WHERE id = ?",
    )
    .bind(item.product_id)
    .bind(&item.name)
    .bind(item.quantity_value)
    .bind(&item.quantity_label)
    .bind(item.estimated_unit_cost)
    .bind(item.sell_price)
    .bind(&item.category)
    .bind(&item.notes)
    .bind(item_id)
    .execute(&mut *conn)
    .await?;
    Ok(item)
}

pub async fn delete_item(pool: &SqlitePool, item_id: i64) -> AppResult<()> {
    let res = sqlx::query("DELETE FROM shopping_list_items WHERE id = ?")
        .bind(item_id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(ReconcileError::ItemNotFound(item_id).into());
    }
    Ok(())
}

/// Direct toggle between pending and completed. Does not move stock.
pub async fn set_item_completed(
    pool: &SqlitePool,
    item_id: i64,
    completed: bool,
) -> AppResult<ShoppingListItem> {
    let mut conn = pool.acquire().await?;
    let res = sqlx::query("UPDATE shopping_list_items SET is_completed = ? WHERE id = ?")
        .bind(i64::from(completed))
        .bind(item_id)
        .execute(&mut *conn)
        .await?;
    if res.rows_affected() == 0 {
        return Err(ReconcileError::ItemNotFound(item_id).into());
    }
    fetch_item(&mut conn, item_id).await
}

// ---------------------------------------------------------------------------
// Transfer to depot
// ---------------------------------------------------------------------------

fn fallback_category(item: &ShoppingListItem, list: &ShoppingList) -> String {
    if let Some(category) = item.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        return category.to_string();
    }
    let title = list.title.trim();
    if !title.is_empty() {
        return title.to_string();
    }
    list.list_type.label().to_string()
}

async fn transfer_in(conn: &mut SqliteConnection, list_id: i64) -> AppResult<TransferSummary> {
    let list = fetch_list(conn, list_id).await?;
    let pending = items_in(conn, list_id, true).await?;

    let mut touched = BTreeSet::new();
    let mut moved = 0i64;
    for item in &pending {
        let units = to_stock_units(item.quantity_value);
        if units == 0 {
            if item.quantity_value > 0.0 {
                warn!(
                    target: "shelfkeeper",
                    event = "transfer_quantity_rounded",
                    item_id = item.id,
                    quantity_value = item.quantity_value
                );
            }
            continue;
        }

        let mut target = None;
        if let Some(product_id) = item.product_id {
            let current: Option<i64> =
                sqlx::query_scalar("SELECT quantity FROM products WHERE id = ?")
                    .bind(product_id)
                    .fetch_optional(&mut *conn)
                    .await?;
            if let Some(current) = current {
                let updated = current
                    .checked_add(units)
                    .ok_or_else(|| stock_overflow(Some(product_id), units))?;
                sqlx::query("UPDATE products SET quantity = ? WHERE id = ?")
                    .bind(updated)
                    .bind(product_id)
                    .execute(&mut *conn)
                    .await?;
                target = Some(product_id);
            } else {
                warn!(
                    target: "shelfkeeper",
                    event = "transfer_dangling_product",
                    item_id = item.id,
                    product_id = product_id
                );
            }
        }

        let product_id = match target {
            Some(id) => id,
            None => {
                let product = NewProduct {
                    name: item.name.clone(),
                    barcode: None,
                    category: Some(fallback_category(item, &list)),
                    buy_price: item.estimated_unit_cost,
                    sell_price: item.sell_price,
                    quantity: units,
                    min_stock: 0,
                };
                let id = ledger::insert_product(conn, &product).await?;
                sqlx::query("UPDATE shopping_list_items SET product_id = ? WHERE id = ?")
                    .bind(id)
                    .bind(item.id)
                    .execute(&mut *conn)
                    .await?;
                info!(
                    target: "shelfkeeper",
                    event = "transfer_product_created",
                    item_id = item.id,
                    product_id = id
                );
                id
            }
        };

        touched.insert(product_id);
        moved = moved
            .checked_add(units)
            .ok_or_else(|| stock_overflow(None, units))?;
    }

    sqlx::query("UPDATE shopping_list_items SET is_completed = 1 WHERE list_id = ? AND is_completed = 0")
        .bind(list_id)
        .execute(&mut *conn)
        .await?;

    let summary = TransferSummary {
        products_touched: touched.len(),
        quantity_moved: moved,
    };
    info!(
        target: "shelfkeeper",
        event = "list_transferred",
        list_id = list_id,
        pending_items = pending.len(),
        products_touched = summary.products_touched,
        quantity_moved = summary.quantity_moved
    );
    Ok(summary)
}

fn partial(list_id: i64) -> impl FnOnce(AppError) -> AppError {
    move |source| {
        // Validation and lookup failures keep their own code; the rollback still applies.
        if source.is_validation() || source.code().starts_with("RECONCILE/") {
            source
        } else {
            ReconcileError::Partial { list_id, source }.into()
        }
    }
}

/// Move every pending item of `list_id` into depot stock and mark the whole
/// list completed. Runs in one transaction.
pub async fn transfer_list_to_depot(pool: &SqlitePool, list_id: i64) -> AppResult<TransferSummary> {
    let mut tx = pool.begin().await?;
    let result = transfer_in(&mut tx, list_id).await;
    finish_tx(tx, result).await.map_err(partial(list_id))
}

pub(crate) async fn add_sold_quantities_in(
    conn: &mut SqliteConnection,
    sold: &[SoldQuantity],
) -> AppResult<()> {
    if sold.is_empty() {
        return Ok(());
    }
    let list_id = ensure_monthly_restock_list_in(conn).await?;

    for line in sold.iter().filter(|l| l.quantity > 0) {
        let product = ledger::fetch_product(conn, line.product_id).await?;
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM shopping_list_items
              WHERE list_id = ? AND product_id = ?
              ORDER BY is_completed ASC, id ASC
              LIMIT 1",
        )
        .bind(list_id)
        .bind(line.product_id)
        .fetch_optional(&mut *conn)
        .await?;

        match existing {
            Some(item_id) => {
                // A completed row restarts its count; a pending one accumulates.
                sqlx::query(
                    "UPDATE shopping_list_items
                        SET quantity_value = CASE WHEN is_completed = 1 THEN ?1
                                                  ELSE quantity_value + ?1 END,
                            is_completed = 0,
                            name = ?2,
                            estimated_unit_cost = ?3,
                            sell_price = ?4,
                            category = ?5
                      WHERE id = ?6",
                )
                .bind(line.quantity as f64)
                .bind(&product.name)
                .bind(product.buy_price)
                .bind(product.sell_price)
                .bind(&product.category)
                .bind(item_id)
                .execute(&mut *conn)
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO shopping_list_items
                       (list_id, product_id, name, quantity_value, estimated_unit_cost,
                        sell_price, category, is_completed, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)",
                )
                .bind(list_id)
                .bind(line.product_id)
                .bind(&product.name)
                .bind(line.quantity as f64)
                .bind(product.buy_price)
                .bind(product.sell_price)
                .bind(&product.category)
                .bind(now_ms())
                .execute(&mut *conn)
                .await?;
            }
        }
    }

    info!(
        target: "shelfkeeper",
        event = "monthly_accumulated",
        list_id = list_id,
        lines = sold.len()
    );
    Ok(())
}

/// Add sold quantities to the monthly restock list in one transaction.
pub async fn add_sold_quantities_to_monthly_restock(
    pool: &SqlitePool,
    sold: &[SoldQuantity],
) -> AppResult<()> {
    let sold = sold.to_vec();
    run_in_tx(pool, move |conn| {
        Box::pin(async move { add_sold_quantities_in(conn, &sold).await })
    })
    .await
}

async fn reset_monthly_in(conn: &mut SqliteConnection, list_id: i64) -> AppResult<u64> {
    let list = fetch_list(conn, list_id).await?;
    if list.list_type != ListType::MonthlyRestock {
        return Err(ReconcileError::NotMonthlyList(list_id).into());
    }
    let res = sqlx::query(
        "UPDATE shopping_list_items SET is_completed = 1, quantity_value = 0 WHERE list_id = ?",
    )
    .bind(list_id)
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected())
}

/// Zero and complete every monthly item so the next period starts clean.
/// Rows and their product links are kept for reuse.
pub async fn reset_monthly_restock_after_transfer(pool: &SqlitePool, list_id: i64) -> AppResult<u64> {
    let mut tx = pool.begin().await?;
    let result = reset_monthly_in(&mut tx, list_id).await;
    finish_tx(tx, result).await
}

/// The user-facing "transfer items" action for the monthly list: transfer,
/// then reset, atomically.
pub async fn transfer_monthly_restock(
    pool: &SqlitePool,
    list_id: Option<i64>,
) -> AppResult<TransferSummary> {
    let mut tx = pool.begin().await?;
    let result: AppResult<(i64, TransferSummary)> = async {
        let list_id = match list_id {
            Some(id) => id,
            None => ensure_monthly_restock_list_in(&mut tx).await?,
        };
        let summary = transfer_in(&mut tx, list_id).await?;
        reset_monthly_in(&mut tx, list_id).await?;
        Ok((list_id, summary))
    }
    .await;
    let target = result.as_ref().map(|(id, _)| *id).unwrap_or(list_id.unwrap_or(0));
    finish_tx(tx, result)
        .await
        .map(|(_, summary)| summary)
        .map_err(partial(target))
}
