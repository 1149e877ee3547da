use std::path::Path;
use std::str::FromStr;

use routesale_core::db::{Database, OrderFilter, Repositories};
use routesale_core::models::{Order, OrderId, OrderItemId, OrderStatus};
use routesale_core::orders::{CreateOrder, DeliveredItem, NewOrderItem, OrderPatch};
use routesale_core::{AuthContext, OrderLifecycleManager};

use crate::cli::OrderCommands;
use crate::commands::common::{
    format_event_lines, format_order_lines, parse_date, parse_id, parse_json, read_input,
    version_guard, Session,
};
use crate::error::CliError;

/// Open the database and run `action` against a fresh lifecycle manager.
pub fn with_manager<T>(
    session: &Session,
    action: impl FnOnce(&OrderLifecycleManager, &mut Database, &AuthContext) -> routesale_core::Result<T>,
) -> Result<T, CliError> {
    let ctx = session.context()?;
    let manager = OrderLifecycleManager::new(Repositories::sqlite(), session.clock());
    let mut db = session.open_database()?;
    Ok(action(&manager, &mut db, &ctx)?)
}

pub fn create_order(session: &Session, raw: &str) -> Result<Order, CliError> {
    let request: CreateOrder = parse_json(raw)?;
    with_manager(session, |manager, db, ctx| manager.create(db, ctx, request))
}

pub fn list_orders(
    session: &Session,
    status: Option<&str>,
    seller: Option<&str>,
    date: Option<&str>,
    limit: usize,
    offset: usize,
) -> Result<Vec<Order>, CliError> {
    let filter = OrderFilter {
        status: status.map(OrderStatus::from_str).transpose()?,
        seller_id: seller.map(str::to_string),
        delivery_date: date.map(parse_date).transpose()?,
    };
    with_manager(session, |manager, db, ctx| {
        manager.list(db, ctx, &filter, limit, offset)
    })
}

pub fn run_order(session: &Session, command: OrderCommands) -> Result<(), CliError> {
    let order = match command {
        OrderCommands::Create { file } => create_order(session, &read_input(file.as_deref())?)?,
        OrderCommands::Show { id } => {
            let id: OrderId = parse_id("order", &id)?;
            with_manager(session, |manager, db, ctx| manager.get(db, ctx, &id))?
        }
        OrderCommands::List {
            status,
            seller,
            date,
            limit,
            offset,
            json,
        } => {
            let orders = list_orders(
                session,
                status.as_deref(),
                seller.as_deref(),
                date.as_deref(),
                limit,
                offset,
            )?;
            return print_orders(&orders, json);
        }
        OrderCommands::Events { id, json } => {
            let id: OrderId = parse_id("order", &id)?;
            let events = with_manager(session, |manager, db, ctx| manager.events(db, ctx, &id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else {
                for line in format_event_lines(&events) {
                    println!("{line}");
                }
            }
            return Ok(());
        }
        OrderCommands::Update { id, guard, file } => {
            let id: OrderId = parse_id("order", &id)?;
            let patch: OrderPatch = parse_json(&read_input(file.as_deref())?)?;
            let guard = version_guard(&guard);
            with_manager(session, |manager, db, ctx| {
                manager.update(db, ctx, &id, &guard, patch)
            })?
        }
        OrderCommands::Confirm { id, guard } => {
            let id: OrderId = parse_id("order", &id)?;
            let guard = version_guard(&guard);
            with_manager(session, |manager, db, ctx| {
                manager.confirm(db, ctx, &id, &guard)
            })?
        }
        OrderCommands::Cancel { id, guard } => {
            let id: OrderId = parse_id("order", &id)?;
            let guard = version_guard(&guard);
            with_manager(session, |manager, db, ctx| {
                manager.cancel(db, ctx, &id, &guard)
            })?
        }
        OrderCommands::ModifyItem {
            id,
            item,
            quantity,
            guard,
        } => {
            let id: OrderId = parse_id("order", &id)?;
            let item: OrderItemId = parse_id("order item", &item)?;
            let guard = version_guard(&guard);
            with_manager(session, |manager, db, ctx| {
                manager.modify_item(db, ctx, &id, item, quantity, &guard)
            })?
        }
        OrderCommands::AddItem {
            id,
            variant,
            quantity,
            price,
            guard,
        } => {
            let id: OrderId = parse_id("order", &id)?;
            let item = NewOrderItem {
                variant_id: variant,
                quantity,
                unit_price: price,
            };
            let guard = version_guard(&guard);
            with_manager(session, |manager, db, ctx| {
                manager.add_item(db, ctx, &id, &item, &guard)
            })?
        }
        OrderCommands::RemoveItem { id, item, guard } => {
            let id: OrderId = parse_id("order", &id)?;
            let item: OrderItemId = parse_id("order item", &item)?;
            let guard = version_guard(&guard);
            with_manager(session, |manager, db, ctx| {
                manager.remove_item(db, ctx, &id, item, &guard)
            })?
        }
        OrderCommands::Reprice {
            id,
            item,
            price,
            guard,
        } => {
            let id: OrderId = parse_id("order", &id)?;
            let item: OrderItemId = parse_id("order item", &item)?;
            let guard = version_guard(&guard);
            with_manager(session, |manager, db, ctx| {
                manager.reprice_item(db, ctx, &id, item, price, &guard)
            })?
        }
        OrderCommands::Deliver { id, guard, file } => {
            let id: OrderId = parse_id("order", &id)?;
            let delivered: Vec<DeliveredItem> = match file.as_deref() {
                Some(path) => parse_delivered_items(path)?,
                None => Vec::new(),
            };
            let guard = version_guard(&guard);
            let delivery = with_manager(session, |manager, db, ctx| {
                manager.deliver(db, ctx, &id, &delivered, &guard)
            })?;
            println!("{}", serde_json::to_string_pretty(&delivery)?);
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&order)?);
    Ok(())
}

fn print_orders(orders: &[Order], as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(orders)?);
        return Ok(());
    }

    if orders.is_empty() {
        println!("No orders found.");
        return Ok(());
    }

    for line in format_order_lines(orders) {
        println!("{line}");
    }
    Ok(())
}

pub fn parse_delivered_items(path: &Path) -> Result<Vec<DeliveredItem>, CliError> {
    parse_json(&read_input(Some(path))?)
}
