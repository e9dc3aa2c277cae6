use anyhow::Result;
use shelfkeeper_lib::ledger::{self, SaleLine};
use shelfkeeper_lib::model::{ListType, PaymentStatus, Priority};
use shelfkeeper_lib::reconcile::{
    self, NewListItem, NewShoppingList, SoldQuantity, TransferSummary, UpdateListItem,
    UpdateShoppingList,
};

mod util;

#[tokio::test]
async fn transfer_moves_pending_quantities_into_stock() -> Result<()> {
    let pool = util::ready_pool().await;
    let rice = util::product(&pool, "Rice", 2, 4.0).await;
    let list = reconcile::create_list(&pool, &NewShoppingList::new("Weekly", ListType::Restock)).await?;
    reconcile::add_item(&pool, list.id, &NewListItem::new("", 3.0).product(rice.id)).await?;
    reconcile::add_item(&pool, list.id, &NewListItem::new("Rice again", 2.4).product(rice.id)).await?;
    let done = reconcile::add_item(&pool, list.id, &NewListItem::new("Old", 9.0).product(rice.id)).await?;
    reconcile::set_item_completed(&pool, done.id, true).await?;

    let summary = reconcile::transfer_list_to_depot(&pool, list.id).await?;
    assert_eq!(
        summary,
        TransferSummary {
            products_touched: 1,
            quantity_moved: 5
        }
    );
    assert_eq!(util::stock_of(&pool, rice.id).await, 2 + 3 + 2);

    let items = reconcile::list_items(&pool, list.id).await?;
    assert!(items.iter().all(|i| i.is_completed));
    assert_eq!(items[0].name, "Rice");

    let again = reconcile::transfer_list_to_depot(&pool, list.id).await?;
    assert_eq!(again, TransferSummary::default());
    assert_eq!(util::stock_of(&pool, rice.id).await, 7);
    Ok(())
}

#[tokio::test]
async fn unlinked_items_create_products() -> Result<()> {
    let pool = util::ready_pool().await;
    let list = reconcile::create_list(&pool, &NewShoppingList::new("Bakery run", ListType::Restock)).await?;
    let flour = reconcile::add_item(
        &pool,
        list.id,
        &NewListItem::new("Flour", 4.0).prices(1.2, 2.0),
    )
    .await?;
    let yeast = reconcile::add_item(
        &pool,
        list.id,
        &NewListItem::new("Yeast", 2.0).category("Baking"),
    )
    .await?;
    let nothing = reconcile::add_item(&pool, list.id, &NewListItem::new("Nothing", 0.0)).await?;

    let summary = reconcile::transfer_list_to_depot(&pool, list.id).await?;
    assert_eq!(summary.products_touched, 2);
    assert_eq!(summary.quantity_moved, 6);

    let items = reconcile::list_items(&pool, list.id).await?;
    let linked = |id: i64| items.iter().find(|i| i.id == id).and_then(|i| i.product_id);

    let flour_product = ledger::get_product(&pool, linked(flour.id).expect("flour linked")).await?;
    assert_eq!(flour_product.name, "Flour");
    assert_eq!(flour_product.quantity, 4);
    assert_eq!(flour_product.buy_price, 1.2);
    assert_eq!(flour_product.sell_price, 2.0);
    assert_eq!(flour_product.category.as_deref(), Some("Bakery run"));

    let yeast_product = ledger::get_product(&pool, linked(yeast.id).expect("yeast linked")).await?;
    assert_eq!(yeast_product.category.as_deref(), Some("Baking"));

    assert_eq!(linked(nothing.id), None);
    assert!(items.iter().all(|i| i.is_completed));
    assert_eq!(ledger::list_products(&pool).await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn dangling_product_link_falls_back_to_creation() -> Result<()> {
    let pool = util::ready_pool().await;
    let list = reconcile::create_list(&pool, &NewShoppingList::new("Misc", ListType::CustomerOrder)).await?;
    let item = reconcile::add_item(&pool, list.id, &NewListItem::new("Soap", 2.0)).await?;
    sqlx::query("PRAGMA foreign_keys=OFF").execute(&pool).await?;
    sqlx::query("UPDATE shopping_list_items SET product_id = 404 WHERE id = ?")
        .bind(item.id)
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys=ON").execute(&pool).await?;

    let summary = reconcile::transfer_list_to_depot(&pool, list.id).await?;
    assert_eq!(summary.products_touched, 1);
    let items = reconcile::list_items(&pool, list.id).await?;
    let product = ledger::get_product(&pool, items[0].product_id.expect("relinked")).await?;
    assert_eq!(product.name, "Soap");
    assert_eq!(product.quantity, 2);
    Ok(())
}

#[tokio::test]
async fn sales_accumulate_on_the_monthly_list() -> Result<()> {
    let pool = util::ready_pool().await;
    let tea = util::product(&pool, "Tea", 50, 2.0).await;
    let monthly = reconcile::ensure_monthly_restock_list(&pool).await?;
    assert_eq!(reconcile::ensure_monthly_restock_list(&pool).await?, monthly);

    ledger::complete_sale(&pool, None, PaymentStatus::FullyPaid, &[SaleLine::new(tea.id, 4)]).await?;
    ledger::complete_sale(&pool, None, PaymentStatus::FullyPaid, &[SaleLine::new(tea.id, 6)]).await?;

    let items = reconcile::list_items(&pool, monthly).await?;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_id, Some(tea.id));
    assert_eq!(items[0].quantity_value, 10.0);
    assert!(!items[0].is_completed);
    Ok(())
}

#[tokio::test]
async fn accumulator_refreshes_cached_product_fields() -> Result<()> {
    let pool = util::ready_pool().await;
    let tea = util::product(&pool, "Tea", 50, 2.0).await;
    reconcile::add_sold_quantities_to_monthly_restock(
        &pool,
        &[SoldQuantity {
            product_id: tea.id,
            quantity: 1,
        }],
    )
    .await?;
    ledger::update_product(
        &pool,
        tea.id,
        &ledger::UpdateProduct {
            name: Some("Green tea".into()),
            sell_price: Some(2.5),
            ..Default::default()
        },
    )
    .await?;
    reconcile::add_sold_quantities_to_monthly_restock(
        &pool,
        &[SoldQuantity {
            product_id: tea.id,
            quantity: 2,
        }],
    )
    .await?;

    let monthly = reconcile::ensure_monthly_restock_list(&pool).await?;
    let items = reconcile::list_items(&pool, monthly).await?;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Green tea");
    assert_eq!(items[0].sell_price, 2.5);
    assert_eq!(items[0].quantity_value, 3.0);
    Ok(())
}

#[tokio::test]
async fn widget_round_trip_through_monthly_restock() -> Result<()> {
    let pool = util::ready_pool().await;
    let widget = util::product(&pool, "Widget", 10, 5.0).await;

    ledger::complete_sale(&pool, None, PaymentStatus::FullyPaid, &[SaleLine::new(widget.id, 3)]).await?;
    assert_eq!(util::stock_of(&pool, widget.id).await, 7);
    ledger::complete_sale(&pool, None, PaymentStatus::FullyPaid, &[SaleLine::new(widget.id, 2)]).await?;
    assert_eq!(util::stock_of(&pool, widget.id).await, 5);

    let monthly = reconcile::ensure_monthly_restock_list(&pool).await?;
    let items = reconcile::list_items(&pool, monthly).await?;
    assert_eq!(items[0].quantity_value, 5.0);

    let summary = reconcile::transfer_monthly_restock(&pool, None).await?;
    assert_eq!(summary.quantity_moved, 5);
    assert_eq!(util::stock_of(&pool, widget.id).await, 10);

    let items = reconcile::list_items(&pool, monthly).await?;
    assert_eq!(items.len(), 1);
    assert!(items[0].is_completed);
    assert_eq!(items[0].quantity_value, 0.0);
    assert_eq!(items[0].product_id, Some(widget.id));

    // Next period reopens the same row.
    ledger::complete_sale(&pool, None, PaymentStatus::FullyPaid, &[SaleLine::new(widget.id, 1)]).await?;
    let items = reconcile::list_items(&pool, monthly).await?;
    assert_eq!(items.len(), 1);
    assert!(!items[0].is_completed);
    assert_eq!(items[0].quantity_value, 1.0);

    let idle = reconcile::transfer_monthly_restock(&pool, Some(monthly)).await?;
    assert_eq!(idle.quantity_moved, 1);
    let noop = reconcile::transfer_monthly_restock(&pool, Some(monthly)).await?;
    assert_eq!(noop, TransferSummary::default());
    assert_eq!(util::stock_of(&pool, widget.id).await, 10);
    Ok(())
}

#[tokio::test]
async fn monthly_list_is_protected() -> Result<()> {
    let pool = util::ready_pool().await;
    let monthly = reconcile::ensure_monthly_restock_list(&pool).await?;

    let delete = reconcile::delete_list(&pool, monthly).await.unwrap_err();
    assert_eq!(delete.code(), "VALIDATION/MONTHLY_LIST_UNDELETABLE");

    let create = reconcile::create_list(&pool, &NewShoppingList::new("Another", ListType::MonthlyRestock))
        .await
        .unwrap_err();
    assert_eq!(create.code(), "VALIDATION/MONTHLY_LIST_RESERVED");

    let other = reconcile::create_list(&pool, &NewShoppingList::new("Errand", ListType::Restock)).await?;
    let reset = reconcile::reset_monthly_restock_after_transfer(&pool, other.id)
        .await
        .unwrap_err();
    assert_eq!(reset.code(), "VALIDATION/NOT_MONTHLY_LIST");
    Ok(())
}

#[tokio::test]
async fn list_and_item_crud() -> Result<()> {
    let pool = util::ready_pool().await;
    let list = reconcile::create_list(
        &pool,
        &NewShoppingList::new("  Party  ", ListType::CustomerOrder).priority(Priority::High),
    )
    .await?;
    assert_eq!(list.title, "Party");
    assert_eq!(list.priority, Priority::High);

    let updated = reconcile::update_list(
        &pool,
        list.id,
        &UpdateShoppingList {
            status: Some(shelfkeeper_lib::model::ListStatus::Archived),
            notes: Some(Some("Saturday".into())),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(updated.notes.as_deref(), Some("Saturday"));
    assert!(reconcile::list_lists(&pool, false)
        .await?
        .iter()
        .all(|l| l.id != list.id));
    assert!(reconcile::list_lists(&pool, true)
        .await?
        .iter()
        .any(|l| l.id == list.id));

    let item = reconcile::add_item(&pool, list.id, &NewListItem::new("Cake", 1.0)).await?;
    let toggled = reconcile::set_item_completed(&pool, item.id, true).await?;
    assert!(toggled.is_completed);
    let toggled = reconcile::set_item_completed(&pool, item.id, false).await?;
    assert!(!toggled.is_completed);

    let edited = reconcile::update_item(
        &pool,
        item.id,
        &UpdateListItem {
            quantity_value: Some(2.0),
            quantity_label: Some(Some("boxes".into())),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(edited.quantity_value, 2.0);
    assert_eq!(edited.quantity_label.as_deref(), Some("boxes"));
    let negative = reconcile::update_item(
        &pool,
        item.id,
        &UpdateListItem {
            quantity_value: Some(-1.0),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(negative.code(), "VALIDATION/INVALID_AMOUNT");

    let blank = reconcile::add_item(&pool, list.id, &NewListItem::new(" ", 1.0)).await.unwrap_err();
    assert_eq!(blank.code(), "VALIDATION/MISSING_FIELD");

    let spare = reconcile::add_item(&pool, list.id, &NewListItem::new("Candles", 12.0)).await?;
    reconcile::delete_item(&pool, spare.id).await?;
    let missing = reconcile::delete_item(&pool, spare.id).await.unwrap_err();
    assert_eq!(missing.code(), "RECONCILE/ITEM_NOT_FOUND");
    assert_eq!(reconcile::list_items(&pool, list.id).await?.len(), 1);

    reconcile::delete_list(&pool, list.id).await?;
    assert_eq!(util::count(&pool, "shopping_list_items").await, 0);
    let gone = reconcile::get_list(&pool, list.id).await.unwrap_err();
    assert_eq!(gone.code(), "RECONCILE/LIST_NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn oversized_list_quantities_are_rejected() -> Result<()> {
    let pool = util::ready_pool().await;
    let rice = util::product(&pool, "Rice", 2, 4.0).await;
    let list = reconcile::create_list(&pool, &NewShoppingList::new("Bulk", ListType::Restock)).await?;

    let err = reconcile::add_item(&pool, list.id, &NewListItem::new("", 1e19).product(rice.id))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION/INVALID_AMOUNT");

    let item = reconcile::add_item(&pool, list.id, &NewListItem::new("", 5.0).product(rice.id)).await?;
    let err = reconcile::update_item(
        &pool,
        item.id,
        &UpdateListItem {
            quantity_value: Some(2e6),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "VALIDATION/INVALID_AMOUNT");
    assert_eq!(reconcile::list_items(&pool, list.id).await?[0].quantity_value, 5.0);
    Ok(())
}

#[tokio::test]
async fn transfer_refuses_to_overflow_stock() -> Result<()> {
    let pool = util::ready_pool().await;
    let rice = util::product(&pool, "Rice", 2, 4.0).await;
    sqlx::query("UPDATE products SET quantity = ? WHERE id = ?")
        .bind(i64::MAX - 1)
        .bind(rice.id)
        .execute(&pool)
        .await?;
    let list = reconcile::create_list(&pool, &NewShoppingList::new("Weekly", ListType::Restock)).await?;
    reconcile::add_item(&pool, list.id, &NewListItem::new("", 5.0).product(rice.id)).await?;

    let err = reconcile::transfer_list_to_depot(&pool, list.id).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION/STOCK_OVERFLOW");

    let kind: String = sqlx::query_scalar("SELECT typeof(quantity) FROM products WHERE id = ?")
        .bind(rice.id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(kind, "integer");
    assert_eq!(util::stock_of(&pool, rice.id).await, i64::MAX - 1);
    assert!(reconcile::list_items(&pool, list.id)
        .await?
        .iter()
        .all(|i| !i.is_completed));
    Ok(())
}

async fn block_product_inserts(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TRIGGER block_product_insert BEFORE INSERT ON products
         BEGIN SELECT RAISE(ABORT, 'product catalogue locked'); END",
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[tokio::test]
async fn failed_transfer_rolls_back_every_item() -> Result<()> {
    let pool = util::ready_pool().await;
    let rice = util::product(&pool, "Rice", 2, 4.0).await;
    let list = reconcile::create_list(&pool, &NewShoppingList::new("Weekly", ListType::Restock)).await?;
    reconcile::add_item(&pool, list.id, &NewListItem::new("", 3.0).product(rice.id)).await?;
    reconcile::add_item(&pool, list.id, &NewListItem::new("Boom", 1.0)).await?;
    block_product_inserts(&pool).await?;

    let err = reconcile::transfer_list_to_depot(&pool, list.id).await.unwrap_err();
    assert_eq!(err.code(), "RECONCILE/PARTIAL");
    assert_eq!(err.context().get("list_id"), Some(&list.id.to_string()));
    assert!(err.cause().is_some());

    assert_eq!(util::stock_of(&pool, rice.id).await, 2);
    let items = reconcile::list_items(&pool, list.id).await?;
    assert_eq!(items.iter().filter(|i| !i.is_completed).count(), 2);
    assert_eq!(util::count(&pool, "products").await, 1);
    Ok(())
}

#[tokio::test]
async fn failed_monthly_transfer_keeps_the_list_intact() -> Result<()> {
    let pool = util::ready_pool().await;
    let tea = util::product(&pool, "Tea", 20, 2.0).await;
    let monthly = reconcile::ensure_monthly_restock_list(&pool).await?;
    ledger::complete_sale(&pool, None, PaymentStatus::FullyPaid, &[SaleLine::new(tea.id, 4)]).await?;
    reconcile::add_item(&pool, monthly, &NewListItem::new("Boom", 2.0)).await?;
    block_product_inserts(&pool).await?;

    let err = reconcile::transfer_monthly_restock(&pool, None).await.unwrap_err();
    assert_eq!(err.code(), "RECONCILE/PARTIAL");

    assert_eq!(util::stock_of(&pool, tea.id).await, 16);
    let items = reconcile::list_items(&pool, monthly).await?;
    let tea_row = items
        .iter()
        .find(|i| i.product_id == Some(tea.id))
        .expect("tea accumulated");
    assert_eq!(tea_row.quantity_value, 4.0);
    assert!(items.iter().all(|i| !i.is_completed));
    Ok(())
}

#[tokio::test]
async fn fractions_below_one_half_move_no_stock() -> Result<()> {
    let pool = util::ready_pool().await;
    let salt = util::product(&pool, "Salt", 4, 1.0).await;
    let list = reconcile::create_list(&pool, &NewShoppingList::new("Pantry", ListType::Restock)).await?;
    reconcile::add_item(&pool, list.id, &NewListItem::new("", 0.3).product(salt.id)).await?;

    let summary = reconcile::transfer_list_to_depot(&pool, list.id).await?;
    assert_eq!(summary, TransferSummary::default());
    assert_eq!(util::stock_of(&pool, salt.id).await, 4);
    assert!(reconcile::list_items(&pool, list.id).await?[0].is_completed);
    Ok(())
}
