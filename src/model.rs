use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::{AppError, AppResult};

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal { $( $variant:ident => $text:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $variant ),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $( $text => Ok($name::$variant), )+
                    other => Err(AppError::validation(
                        concat!("UNKNOWN_", $what),
                        format!("Unknown {}: {other}", $what.to_ascii_lowercase()),
                    )
                    .with_context("value", other)),
                }
            }
        }
    };
}

string_enum!(
    /// Descriptive only; derivable as `paid_amount < total_amount => Debt`.
    PaymentStatus, "PAYMENT_STATUS" {
        FullyPaid => "fully_paid",
        Debt => "debt",
    }
);

string_enum!(
    ListType, "LIST_TYPE" {
        Restock => "restock",
        CustomerOrder => "customer_order",
        MonthlyRestock => "monthly_restock",
    }
);

string_enum!(
    ListStatus, "LIST_STATUS" {
        Active => "active",
        Completed => "completed",
        Archived => "archived",
    }
);

string_enum!(
    Priority, "PRIORITY" {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
);

impl PaymentStatus {
    pub fn derive(total_amount: f64, paid_amount: f64) -> Self {
        if paid_amount < total_amount {
            PaymentStatus::Debt
        } else {
            PaymentStatus::FullyPaid
        }
    }
}

impl ListType {
    /// Human label used as a product category when a list item carries none.
    pub fn label(self) -> &'static str {
        match self {
            ListType::Restock => "Restock",
            ListType::CustomerOrder => "Customer order",
            ListType::MonthlyRestock => "Monthly restock",
        }
    }
}

fn parse_col<T: FromStr<Err = AppError>>(row: &SqliteRow, col: &str) -> AppResult<T> {
    let raw: String = row.try_get(col)?;
    raw.parse::<T>().map_err(|e| e.with_context("column", col))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub barcode: Option<String>,
    pub category: Option<String>,
    pub buy_price: f64,
    pub sell_price: f64,
    pub quantity: i64,
    pub min_stock: i64,
    pub created_at: i64,
}

impl Product {
    pub(crate) const COLUMNS: &'static str =
        "id, name, barcode, category, buy_price, sell_price, quantity, min_stock, created_at";

    pub(crate) fn from_row(row: &SqliteRow) -> AppResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            barcode: row.try_get("barcode")?,
            category: row.try_get("category")?,
            buy_price: row.try_get("buy_price")?,
            sell_price: row.try_get("sell_price")?,
            quantity: row.try_get("quantity")?,
            min_stock: row.try_get("min_stock")?,
            created_at: row.try_get("created_at")?,
        })
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_stock
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub notes: Option<String>,
    pub created_at: i64,
}

impl Customer {
    pub(crate) fn from_row(row: &SqliteRow) -> AppResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub date: i64,
    pub customer_id: Option<i64>,
    pub total_amount: f64,
    pub payment_status: PaymentStatus,
    pub paid_amount: f64,
}

impl Transaction {
    pub(crate) const COLUMNS: &'static str =
        "id, date, customer_id, total_amount, payment_status, paid_amount";

    pub(crate) fn from_row(row: &SqliteRow) -> AppResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            date: row.try_get("date")?,
            customer_id: row.try_get("customer_id")?,
            total_amount: row.try_get("total_amount")?,
            payment_status: parse_col(row, "payment_status")?,
            paid_amount: row.try_get("paid_amount")?,
        })
    }

    /// `total_amount - paid_amount`, clamped at zero.
    pub fn outstanding(&self) -> f64 {
        (self.total_amount - self.paid_amount).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
    pub id: i64,
    pub transaction_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: f64,
    pub line_total: f64,
}

impl TransactionItem {
    pub(crate) fn from_row(row: &SqliteRow) -> AppResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            transaction_id: row.try_get("transaction_id")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
            line_total: row.try_get("line_total")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLog {
    pub id: i64,
    pub transaction_id: i64,
    pub amount: f64,
    pub note: Option<String>,
    pub created_at: i64,
}

impl PaymentLog {
    pub(crate) fn from_row(row: &SqliteRow) -> AppResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            transaction_id: row.try_get("transaction_id")?,
            amount: row.try_get("amount")?,
            note: row.try_get("note")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingList {
    pub id: i64,
    pub title: String,
    #[serde(rename = "type")]
    pub list_type: ListType,
    pub status: ListStatus,
    pub priority: Priority,
    pub notes: Option<String>,
    pub customer_id: Option<i64>,
    pub due_date: Option<String>,
    pub created_at: i64,
}

impl ShoppingList {
    pub(crate) const COLUMNS: &'static str =
        "id, title, type, status, priority, notes, customer_id, due_date, created_at";

    pub(crate) fn from_row(row: &SqliteRow) -> AppResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            list_type: parse_col(row, "type")?,
            status: parse_col(row, "status")?,
            priority: parse_col(row, "priority")?,
            notes: row.try_get("notes")?,
            customer_id: row.try_get("customer_id")?,
            due_date: row.try_get("due_date")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingListItem {
    pub id: i64,
    pub list_id: i64,
    pub product_id: Option<i64>,
    pub name: String,
    pub quantity_value: f64,
    pub quantity_label: Option<String>,
    pub estimated_unit_cost: f64,
    pub sell_price: f64,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub is_completed: bool,
    pub created_at: i64,
}

impl ShoppingListItem {
    pub(crate) const COLUMNS: &'static str = "id, list_id, product_id, name, quantity_value, \
        quantity_label, estimated_unit_cost, sell_price, category, notes, is_completed, created_at";

    pub(crate) fn from_row(row: &SqliteRow) -> AppResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            list_id: row.try_get("list_id")?,
            product_id: row.try_get("product_id")?,
            name: row.try_get("name")?,
            quantity_value: row.try_get("quantity_value")?,
            quantity_label: row.try_get("quantity_label")?,
            estimated_unit_cost: row.try_get("estimated_unit_cost")?,
            sell_price: row.try_get("sell_price")?,
            category: row.try_get("category")?,
            notes: row.try_get("notes")?,
            is_completed: row.try_get::<i64, _>("is_completed")? != 0,
            created_at: row.try_get("created_at")?,
        })
    }
}
