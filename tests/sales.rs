use anyhow::Result;
use shelfkeeper_lib::ledger::{self, NewCustomer, SaleLine, TransactionFilter};
use shelfkeeper_lib::model::PaymentStatus;

mod util;

#[tokio::test]
async fn sale_conserves_stock_and_records_lines() -> Result<()> {
    let pool = util::ready_pool().await;
    let tea = util::product(&pool, "Tea", 10, 2.0).await;
    let rice = util::product(&pool, "Rice", 5, 4.5).await;

    let sale = ledger::complete_sale(
        &pool,
        None,
        PaymentStatus::FullyPaid,
        &[SaleLine::new(tea.id, 3), SaleLine::new(rice.id, 2).at(4.0)],
    )
    .await?;

    assert_eq!(util::stock_of(&pool, tea.id).await, 7);
    assert_eq!(util::stock_of(&pool, rice.id).await, 3);
    assert_eq!(sale.total_amount, 3.0 * 2.0 + 2.0 * 4.0);
    assert_eq!(sale.paid_amount, sale.total_amount);
    assert_eq!(sale.payment_status, PaymentStatus::FullyPaid);

    let details = ledger::transaction_details(&pool, sale.id).await?;
    assert_eq!(details.items.len(), 2);
    assert!(details
        .items
        .iter()
        .all(|i| i.line_total == i.quantity as f64 * i.unit_price));
    assert_eq!(details.payments.len(), 1);
    assert_eq!(details.payments[0].amount, sale.total_amount);
    Ok(())
}

#[tokio::test]
async fn insufficient_stock_rejects_whole_cart() -> Result<()> {
    let pool = util::ready_pool().await;
    let tea = util::product(&pool, "Tea", 10, 2.0).await;
    let rice = util::product(&pool, "Rice", 1, 4.5).await;

    let err = ledger::complete_sale(
        &pool,
        None,
        PaymentStatus::FullyPaid,
        &[SaleLine::new(tea.id, 3), SaleLine::new(rice.id, 2)],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "VALIDATION/INSUFFICIENT_STOCK");
    assert_eq!(err.context().get("product_id"), Some(&rice.id.to_string()));

    assert_eq!(util::stock_of(&pool, tea.id).await, 10);
    assert_eq!(util::stock_of(&pool, rice.id).await, 1);
    assert_eq!(util::count(&pool, "transactions").await, 0);
    assert_eq!(util::count(&pool, "transaction_items").await, 0);
    assert_eq!(util::count(&pool, "shopping_list_items").await, 0);
    Ok(())
}

#[tokio::test]
async fn repeated_product_lines_are_checked_together() -> Result<()> {
    let pool = util::ready_pool().await;
    let tea = util::product(&pool, "Tea", 5, 2.0).await;

    let err = ledger::complete_sale(
        &pool,
        None,
        PaymentStatus::FullyPaid,
        &[SaleLine::new(tea.id, 3), SaleLine::new(tea.id, 3)],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "VALIDATION/INSUFFICIENT_STOCK");
    assert_eq!(err.context().get("requested"), Some(&"6".to_string()));
    assert_eq!(util::stock_of(&pool, tea.id).await, 5);
    Ok(())
}

#[tokio::test]
async fn invalid_carts_are_rejected_before_any_write() -> Result<()> {
    let pool = util::ready_pool().await;
    let tea = util::product(&pool, "Tea", 5, 2.0).await;

    let empty = ledger::complete_sale(&pool, None, PaymentStatus::FullyPaid, &[])
        .await
        .unwrap_err();
    assert_eq!(empty.code(), "VALIDATION/EMPTY_CART");

    let zero = ledger::complete_sale(&pool, None, PaymentStatus::FullyPaid, &[SaleLine::new(tea.id, 0)])
        .await
        .unwrap_err();
    assert_eq!(zero.code(), "VALIDATION/INVALID_QUANTITY");

    let unknown = ledger::complete_sale(&pool, None, PaymentStatus::FullyPaid, &[SaleLine::new(999, 1)])
        .await
        .unwrap_err();
    assert_eq!(unknown.code(), "VALIDATION/UNKNOWN_PRODUCT");

    let negative = ledger::complete_sale(
        &pool,
        None,
        PaymentStatus::FullyPaid,
        &[SaleLine::new(tea.id, 1).at(-1.0)],
    )
    .await
    .unwrap_err();
    assert_eq!(negative.code(), "VALIDATION/INVALID_PRICE");

    let nobody = ledger::complete_sale(&pool, Some(42), PaymentStatus::Debt, &[SaleLine::new(tea.id, 1)])
        .await
        .unwrap_err();
    assert_eq!(nobody.code(), "VALIDATION/UNKNOWN_CUSTOMER");

    assert_eq!(util::count(&pool, "transactions").await, 0);
    assert_eq!(util::stock_of(&pool, tea.id).await, 5);
    Ok(())
}

#[tokio::test]
async fn debt_sale_is_listed_per_customer() -> Result<()> {
    let pool = util::ready_pool().await;
    let tea = util::product(&pool, "Tea", 20, 10.0).await;
    let amina = ledger::create_customer(&pool, &NewCustomer::new("Amina")).await?;

    let sale = ledger::complete_sale(
        &pool,
        Some(amina.id),
        PaymentStatus::Debt,
        &[SaleLine::new(tea.id, 10)],
    )
    .await?;
    assert_eq!(sale.paid_amount, 0.0);
    assert_eq!(sale.payment_status, PaymentStatus::Debt);
    assert!(ledger::payment_logs(&pool, sale.id).await?.is_empty());

    ledger::complete_sale(&pool, None, PaymentStatus::FullyPaid, &[SaleLine::new(tea.id, 1)]).await?;

    let debts = ledger::list_transactions(
        &pool,
        TransactionFilter {
            customer_id: None,
            debt_only: true,
        },
    )
    .await?;
    assert_eq!(debts.len(), 1);
    assert_eq!(debts[0].id, sale.id);

    let by_customer = ledger::list_transactions(
        &pool,
        TransactionFilter {
            customer_id: Some(amina.id),
            debt_only: false,
        },
    )
    .await?;
    assert_eq!(by_customer.len(), 1);
    Ok(())
}

#[tokio::test]
async fn accumulator_failure_rolls_back_the_sale() -> Result<()> {
    let pool = util::ready_pool().await;
    let tea = util::product(&pool, "Tea", 10, 2.0).await;
    sqlx::query(
        "CREATE TRIGGER block_list_items BEFORE INSERT ON shopping_list_items
         BEGIN SELECT RAISE(ABORT, 'restock list locked'); END",
    )
    .execute(&pool)
    .await?;

    let err = ledger::complete_sale(&pool, None, PaymentStatus::FullyPaid, &[SaleLine::new(tea.id, 3)])
        .await
        .unwrap_err();
    assert!(!err.is_validation());
    assert!(err.message().contains("restock list locked"));

    assert_eq!(util::stock_of(&pool, tea.id).await, 10);
    assert_eq!(util::count(&pool, "transactions").await, 0);
    assert_eq!(util::count(&pool, "transaction_items").await, 0);
    assert_eq!(util::count(&pool, "payment_logs").await, 0);
    Ok(())
}
