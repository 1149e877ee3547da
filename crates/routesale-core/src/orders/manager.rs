//! Order lifecycle manager.
//!
//! Every mutation runs in one write transaction: load, validate, apply,
//! conditional header write on the base version, item replace, event append.
//! A stale base version fails with `Conflict` and nothing is written.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::context::AuthContext;
use crate::db::{Database, OrderFilter, Repositories, UnitOfWork};
use crate::error::{Error, Result};
use crate::models::{
    CustomerId, Order, OrderEvent, OrderEventId, OrderEventType, OrderId, OrderItemId,
    OrderStatus, Sale,
};
use crate::time::TimeSource;
use crate::util::normalize_text_option;

use super::commands::{
    CreateOrder, DeliveredItem, Delivery, NewOrderItem, OrderPatch, VersionGuard,
};
use super::{delivery, validation};

/// What a mutation did to the loaded order
enum Effect {
    Changed {
        event: OrderEventType,
        payload: Value,
        /// The item set must be rewritten
        items: bool,
    },
    /// Nothing to do; the order is returned as loaded
    Unchanged,
}

impl Effect {
    fn header(event: OrderEventType, payload: Value) -> Self {
        Self::Changed {
            event,
            payload,
            items: false,
        }
    }

    fn with_items(event: OrderEventType, payload: Value) -> Self {
        Self::Changed {
            event,
            payload,
            items: true,
        }
    }
}

/// Versioned state machine over order aggregates.
pub struct OrderLifecycleManager {
    repos: Repositories,
    clock: Arc<dyn TimeSource>,
}

impl OrderLifecycleManager {
    #[must_use]
    pub fn new(repos: Repositories, clock: Arc<dyn TimeSource>) -> Self {
        Self { repos, clock }
    }

    /// Create a draft order at version 1.
    pub fn create(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        request: CreateOrder,
    ) -> Result<Order> {
        ctx.require_write()?;
        let key = normalize_text_option(request.client_event_id.clone());
        let now_ms = self.clock.now().timestamp_millis();
        let uow = db.begin()?;

        if let Some(key) = key.as_deref() {
            if let Some(event) = self.repos.order_events.find_by_key(&uow, key)? {
                if event.event_type != OrderEventType::Created
                    || event.business_id != ctx.business_id
                {
                    return Err(Error::validation(format!(
                        "clientEventId '{key}' was already used for another request"
                    )));
                }
                tracing::debug!(order_id = %event.order_id, "Replaying order creation");
                return self.load(&uow, ctx, &event.order_id);
            }
        }

        validation::delivery_date(request.delivery_date, self.clock.today())?;
        let items = validation::items(&request.items)?;
        self.ensure_customer(&uow, ctx, &request.customer_id)?;
        let seller_id = match request.seller_id {
            Some(seller) => non_blank_seller(seller)?,
            None => ctx.user_id.clone(),
        };

        let mut order = Order {
            id: OrderId::new(),
            business_id: ctx.business_id.clone(),
            customer_id: request.customer_id,
            seller_id,
            delivery_date: request.delivery_date,
            status: OrderStatus::Draft,
            payment_intent: request.payment_intent,
            total_amount: 0,
            notes: normalize_text_option(request.notes),
            version: 1,
            confirmed_snapshot: None,
            delivered_snapshot: None,
            sale_id: None,
            created_by: ctx.user_id.clone(),
            created_at: now_ms,
            updated_at: now_ms,
            items,
        };
        order.recalculate_total()?;

        self.repos.orders.insert(&uow, &order)?;
        let payload = serde_json::to_value(order.snapshot(now_ms))?;
        self.append_event(&uow, ctx, &order, OrderEventType::Created, payload, key, now_ms)?;
        uow.commit()?;

        tracing::info!(order_id = %order.id, total = order.total_amount, "Created order");
        Ok(order)
    }

    pub fn get(&self, db: &mut Database, ctx: &AuthContext, id: &OrderId) -> Result<Order> {
        let uow = db.read()?;
        self.load(&uow, ctx, id)
    }

    pub fn list(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        filter: &OrderFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>> {
        let uow = db.read()?;
        self.repos
            .orders
            .list(&uow, &ctx.business_id, filter, limit, offset)
    }

    /// Event history of an order, oldest first
    pub fn events(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        id: &OrderId,
    ) -> Result<Vec<OrderEvent>> {
        let uow = db.read()?;
        self.load(&uow, ctx, id)?;
        self.repos
            .order_events
            .list_for_order(&uow, &ctx.business_id, id)
    }

    /// Patch header fields; supplied items replace the whole item set.
    pub fn update(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        id: &OrderId,
        guard: &VersionGuard,
        patch: OrderPatch,
    ) -> Result<Order> {
        if patch.is_empty() {
            return Err(Error::validation("order update has no changes"));
        }
        let today = self.clock.today();
        self.mutate(db, ctx, id, guard, OrderEventType::Updated, |uow, order, _| {
            order.ensure_editable("update")?;
            let payload = serde_json::to_value(&patch)?;

            if let Some(customer_id) = patch.customer_id {
                self.ensure_customer(uow, ctx, &customer_id)?;
                order.customer_id = customer_id;
            }
            if let Some(seller) = patch.seller_id {
                order.seller_id = non_blank_seller(seller)?;
            }
            if let Some(date) = patch.delivery_date {
                validation::delivery_date(date, today)?;
                order.delivery_date = date;
            }
            if let Some(intent) = patch.payment_intent {
                order.payment_intent = intent;
            }
            if patch.notes.is_some() {
                order.notes = normalize_text_option(patch.notes);
            }
            let items = match patch.items {
                Some(items) => {
                    order.items = validation::items(&items)?;
                    order.recalculate_total()?;
                    true
                }
                None => false,
            };

            Ok(Effect::Changed {
                event: OrderEventType::Updated,
                payload,
                items,
            })
        })
    }

    /// Draft → confirmed, capturing the confirmed snapshot.
    pub fn confirm(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        id: &OrderId,
        guard: &VersionGuard,
    ) -> Result<Order> {
        let order = self.mutate(db, ctx, id, guard, OrderEventType::Confirmed, |_, order, now_ms| {
            order.transition_to(OrderStatus::Confirmed)?;
            let snapshot = order.snapshot(now_ms);
            let payload = serde_json::to_value(&snapshot)?;
            order.confirmed_snapshot = Some(snapshot);
            Ok(Effect::header(OrderEventType::Confirmed, payload))
        })?;
        tracing::info!(order_id = %order.id, version = order.version, "Confirmed order");
        Ok(order)
    }

    /// Cancel a draft or confirmed order. Cancelling a cancelled order is a
    /// no-op that returns it unchanged.
    pub fn cancel(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        id: &OrderId,
        guard: &VersionGuard,
    ) -> Result<Order> {
        let order = self.mutate(db, ctx, id, guard, OrderEventType::Cancelled, |_, order, _| {
            if order.status == OrderStatus::Cancelled {
                return Ok(Effect::Unchanged);
            }
            let previous = order.status;
            order.transition_to(OrderStatus::Cancelled)?;
            Ok(Effect::header(
                OrderEventType::Cancelled,
                json!({ "previousStatus": previous }),
            ))
        })?;
        tracing::info!(order_id = %order.id, version = order.version, "Cancelled order");
        Ok(order)
    }

    /// Change the ordered quantity of one line. The first edit records the
    /// pre-edit quantity as the line's original quantity.
    pub fn modify_item(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        id: &OrderId,
        item_id: OrderItemId,
        quantity: i64,
        guard: &VersionGuard,
    ) -> Result<Order> {
        self.mutate(db, ctx, id, guard, OrderEventType::ItemUpdated, |_, order, _| {
            order.ensure_editable("modify items on")?;
            validation::quantity(quantity)?;
            let item = order.item_mut(item_id)?;
            let previous = item.quantity;
            item.set_quantity(quantity);
            order.recalculate_total()?;
            Ok(Effect::with_items(
                OrderEventType::ItemUpdated,
                json!({ "itemId": item_id, "quantity": quantity, "previousQuantity": previous }),
            ))
        })
    }

    pub fn add_item(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        id: &OrderId,
        item: &NewOrderItem,
        guard: &VersionGuard,
    ) -> Result<Order> {
        self.mutate(db, ctx, id, guard, OrderEventType::ItemAdded, |_, order, _| {
            order.ensure_editable("add items to")?;
            let item = validation::item(item)?;
            let payload = serde_json::to_value(&item)?;
            order.items.push(item);
            order.recalculate_total()?;
            Ok(Effect::with_items(OrderEventType::ItemAdded, payload))
        })
    }

    pub fn remove_item(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        id: &OrderId,
        item_id: OrderItemId,
        guard: &VersionGuard,
    ) -> Result<Order> {
        self.mutate(db, ctx, id, guard, OrderEventType::ItemRemoved, |_, order, _| {
            order.ensure_editable("remove items from")?;
            let position = order
                .items
                .iter()
                .position(|item| item.id == item_id)
                .ok_or_else(|| Error::not_found(format!("item {item_id} on order {}", order.id)))?;
            if order.items.len() == 1 {
                return Err(Error::validation("an order needs at least one item"));
            }
            let removed = order.items.remove(position);
            order.recalculate_total()?;
            Ok(Effect::with_items(
                OrderEventType::ItemRemoved,
                serde_json::to_value(&removed)?,
            ))
        })
    }

    /// Override the unit price of one line.
    pub fn reprice_item(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        id: &OrderId,
        item_id: OrderItemId,
        final_unit_price: i64,
        guard: &VersionGuard,
    ) -> Result<Order> {
        self.mutate(db, ctx, id, guard, OrderEventType::Repriced, |_, order, _| {
            order.ensure_editable("reprice items on")?;
            validation::price(final_unit_price, "final unit price")?;
            let item = order.item_mut(item_id)?;
            let previous = item.effective_unit_price();
            item.final_unit_price = Some(final_unit_price);
            item.is_modified = true;
            order.recalculate_total()?;
            Ok(Effect::with_items(
                OrderEventType::Repriced,
                json!({
                    "itemId": item_id,
                    "finalUnitPrice": final_unit_price,
                    "previousUnitPrice": previous
                }),
            ))
        })
    }

    /// Confirmed → delivered on the scheduled day, deriving the sale in the
    /// same transaction.
    pub fn deliver(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        id: &OrderId,
        delivered: &[DeliveredItem],
        guard: &VersionGuard,
    ) -> Result<Delivery> {
        let today = self.clock.today();
        let order = self.mutate(
            db,
            ctx,
            id,
            guard,
            OrderEventType::Delivered,
            |uow, order, now_ms| {
                order.transition_to(OrderStatus::Delivered)?;
                delivery::ensure_delivery_day(order, today)?;
                delivery::record_delivered(order, delivered)?;

                let sale = delivery::derive_sale(order, today, now_ms)?;
                self.repos.sales.insert(uow, &sale)?;
                order.sale_id = Some(sale.id);
                order.delivered_snapshot = Some(order.snapshot(now_ms));

                Ok(Effect::with_items(
                    OrderEventType::Delivered,
                    json!({ "saleId": sale.id, "items": delivered }),
                ))
            },
        )?;

        let sale = self.delivered_sale(db, ctx, &order)?;
        tracing::info!(
            order_id = %order.id,
            sale_id = %sale.id,
            total = sale.total_amount,
            "Delivered order"
        );
        Ok(Delivery { order, sale })
    }

    fn delivered_sale(&self, db: &mut Database, ctx: &AuthContext, order: &Order) -> Result<Sale> {
        let sale_id = order
            .sale_id
            .ok_or_else(|| Error::validation(format!("order {} has not been delivered", order.id)))?;
        let uow = db.read()?;
        self.repos
            .sales
            .get(&uow, &ctx.business_id, &sale_id)?
            .ok_or_else(|| Error::not_found(format!("sale {sale_id}")))
    }

    /// Shared mutation path.
    ///
    /// The change runs against the loaded order with its version already
    /// bumped, so validation failures win over a stale base version.
    fn mutate(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        id: &OrderId,
        guard: &VersionGuard,
        action: OrderEventType,
        change: impl FnOnce(&UnitOfWork<'_>, &mut Order, i64) -> Result<Effect>,
    ) -> Result<Order> {
        ctx.require_write()?;
        let key = normalize_text_option(guard.client_event_id.clone());
        let now_ms = self.clock.now().timestamp_millis();
        let uow = db.begin()?;

        if let Some(key) = key.as_deref() {
            if let Some(order) = self.replayed(&uow, ctx, id, action, key)? {
                return Ok(order);
            }
        }

        let loaded = self.load(&uow, ctx, id)?;
        let mut order = loaded.clone();
        order.version = loaded.version + 1;
        order.updated_at = now_ms;

        let (event, payload, items) = match change(&uow, &mut order, now_ms)? {
            Effect::Unchanged => return Ok(loaded),
            Effect::Changed {
                event,
                payload,
                items,
            } => (event, payload, items),
        };

        if loaded.version != guard.base_version {
            tracing::warn!(
                order_id = %id,
                expected = guard.base_version,
                actual = loaded.version,
                "Rejected stale order mutation"
            );
            return Err(Error::Conflict {
                expected: guard.base_version,
                actual: loaded.version,
            });
        }

        self.repos
            .orders
            .update_if_version(&uow, &order, guard.base_version)?;
        if items {
            self.repos.orders.replace_items(&uow, &order)?;
        }
        self.append_event(&uow, ctx, &order, event, payload, key, now_ms)?;
        uow.commit()?;

        tracing::debug!(order_id = %id, %event, version = order.version, "Applied order mutation");
        Ok(order)
    }

    /// The current order when `key` was already recorded for the same
    /// action on it.
    fn replayed(
        &self,
        uow: &UnitOfWork<'_>,
        ctx: &AuthContext,
        id: &OrderId,
        action: OrderEventType,
        key: &str,
    ) -> Result<Option<Order>> {
        let Some(event) = self.repos.order_events.find_by_key(uow, key)? else {
            return Ok(None);
        };
        if event.order_id != *id || event.business_id != ctx.business_id {
            return Err(Error::validation(format!(
                "clientEventId '{key}' was already used for another order"
            )));
        }
        if event.event_type != action {
            return Err(Error::validation(format!(
                "clientEventId '{key}' was already used for {}, not {action}",
                event.event_type
            )));
        }
        tracing::debug!(order_id = %id, key, "Replaying order mutation");
        self.load(uow, ctx, id).map(Some)
    }

    fn load(&self, uow: &UnitOfWork<'_>, ctx: &AuthContext, id: &OrderId) -> Result<Order> {
        self.repos
            .orders
            .get(uow, &ctx.business_id, id)?
            .ok_or_else(|| Error::not_found(format!("order {id}")))
    }

    fn ensure_customer(
        &self,
        uow: &UnitOfWork<'_>,
        ctx: &AuthContext,
        customer_id: &CustomerId,
    ) -> Result<()> {
        match self.repos.customers.get(uow, &ctx.business_id, customer_id)? {
            Some(customer) if !customer.is_deleted => Ok(()),
            _ => Err(Error::not_found(format!("customer {customer_id}"))),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn append_event(
        &self,
        uow: &UnitOfWork<'_>,
        ctx: &AuthContext,
        order: &Order,
        event_type: OrderEventType,
        payload: Value,
        idempotency_key: Option<String>,
        now_ms: i64,
    ) -> Result<()> {
        self.repos.order_events.append(
            uow,
            &OrderEvent {
                id: OrderEventId::new(),
                order_id: order.id,
                business_id: order.business_id.clone(),
                event_type,
                version: order.version,
                payload,
                idempotency_key,
                actor_id: ctx.user_id.clone(),
                created_at: now_ms,
            },
        )
    }
}

fn non_blank_seller(seller: String) -> Result<String> {
    normalize_text_option(Some(seller))
        .ok_or_else(|| Error::validation("seller id must not be empty"))
}
