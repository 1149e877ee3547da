//! Server-side batch processor.
//!
//! Each operation is claimed with a durable `pending` record before any
//! domain write, then applied together with its `processed` marker in one
//! transaction. A failing operation is recorded as `failed` and reported in
//! its own result slot; the rest of the batch carries on.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::config::SyncSettings;
use crate::context::AuthContext;
use crate::db::{Database, Repositories, UnitOfWork};
use crate::error::{Error, Result};
use crate::models::{
    Customer, CustomerId, Distribution, DistributionId, EntityKind, Payment, PaymentId, Sale,
    SaleId, SaleItem, SyncOperationRecord, SyncStatus,
};
use crate::time::TimeSource;
use crate::util::{is_temp_id, millis_to_datetime, normalize_text_option};

use super::operation::SyncOperation;
use super::payload::{
    CustomerFields, CustomerPatch, DistributionFields, DistributionPatch, Mutation,
    PaymentFields, PaymentPatch, SaleFields,
};
use super::wire::{BatchResponse, BatchSummary, OperationResult, RawOperation};

/// What the durable record says about an incoming operation
enum Claim {
    /// Already processed: report the recorded result
    Replay(SyncOperationRecord),
    /// Another attempt holds a fresh `pending` marker
    InProgress,
    /// This call owns the operation and must apply it
    Apply,
}

/// Deduplicates and applies sync batches against the domain repositories.
pub struct SyncBatchProcessor {
    repos: Repositories,
    clock: Arc<dyn TimeSource>,
    settings: SyncSettings,
}

impl SyncBatchProcessor {
    #[must_use]
    pub fn new(repos: Repositories, clock: Arc<dyn TimeSource>, settings: SyncSettings) -> Self {
        Self {
            repos,
            clock,
            settings,
        }
    }

    /// Apply a batch, one operation at a time.
    ///
    /// Results come back in submission order. Operations are applied in
    /// dependency order (customers, distributions, sales, payments), keeping
    /// submission order within each entity type.
    pub fn process_batch(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        operations: Vec<RawOperation>,
    ) -> Result<BatchResponse> {
        ctx.require_write()?;
        if operations.len() > self.settings.max_batch_size {
            return Err(Error::validation(format!(
                "batch of {} operations exceeds the limit of {}",
                operations.len(),
                self.settings.max_batch_size
            )));
        }

        let mut results: Vec<Option<OperationResult>> = vec![None; operations.len()];
        let mut accepted = Vec::with_capacity(operations.len());

        for (index, raw) in operations.into_iter().enumerate() {
            let operation_id = raw.operation_id.clone().unwrap_or_default();
            match SyncOperation::from_raw(raw) {
                Ok(operation) => accepted.push((index, operation)),
                Err(error) => {
                    tracing::warn!(%operation_id, %error, "Rejected malformed sync operation");
                    results[index] = Some(OperationResult::failure(
                        operation_id,
                        &error,
                        self.clock.now(),
                    ));
                }
            }
        }

        // Stable sort: per-entity submission order survives
        accepted.sort_by_key(|(_, operation)| operation.entity.apply_rank());

        for (index, operation) in &accepted {
            results[*index] = Some(self.process_operation(db, ctx, operation));
        }

        let results: Vec<OperationResult> = results.into_iter().flatten().collect();
        let summary = BatchSummary::of(&results);
        tracing::info!(
            business_id = %ctx.business_id,
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Processed sync batch"
        );

        Ok(BatchResponse { results, summary })
    }

    fn process_operation(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        operation: &SyncOperation,
    ) -> OperationResult {
        tracing::debug!(
            operation_id = %operation.operation_id,
            entity = %operation.entity,
            action = %operation.action,
            entity_id = %operation.entity_id,
            "Processing sync operation"
        );

        let outcome = match self.claim(db, ctx, operation) {
            Ok(Claim::Replay(record)) => {
                tracing::debug!(operation_id = %operation.operation_id, "Replaying processed operation");
                Ok(OperationResult::replay(&record))
            }
            Ok(Claim::InProgress) => Err(Error::InProgress(format!(
                "operation {} is already being applied",
                operation.operation_id
            ))),
            Ok(Claim::Apply) => match self.apply_and_mark(db, ctx, operation) {
                Ok(result) => Ok(result),
                Err(error) => {
                    self.record_failure(db, ctx, operation, &error);
                    Err(error)
                }
            },
            Err(error) => Err(error),
        };

        outcome.unwrap_or_else(|error| {
            tracing::warn!(
                operation_id = %operation.operation_id,
                code = error.code(),
                %error,
                "Sync operation failed"
            );
            OperationResult::failure(&operation.operation_id, &error, self.clock.now())
        })
    }

    /// Commit the durable marker for this attempt before touching the domain.
    fn claim(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        operation: &SyncOperation,
    ) -> Result<Claim> {
        let now = self.clock.now();
        let records = &self.repos.sync_operations;
        let uow = db.begin()?;

        let claim = match records.get(&uow, &ctx.business_id, &operation.operation_id)? {
            Some(record) if record.status == SyncStatus::Processed => Claim::Replay(record),
            Some(record) if record.status == SyncStatus::Pending && !self.is_stale(&record, now) => {
                Claim::InProgress
            }
            Some(record) => {
                let attempts = records.restart(&uow, &Self::new_record(ctx, operation, now))?;
                tracing::debug!(
                    operation_id = %operation.operation_id,
                    previous = record.status.as_str(),
                    attempts,
                    "Retrying sync operation"
                );
                Claim::Apply
            }
            None => {
                records.insert_pending(&uow, &Self::new_record(ctx, operation, now))?;
                Claim::Apply
            }
        };

        uow.commit()?;
        Ok(claim)
    }

    fn new_record(
        ctx: &AuthContext,
        operation: &SyncOperation,
        now: DateTime<Utc>,
    ) -> SyncOperationRecord {
        SyncOperationRecord {
            business_id: ctx.business_id.clone(),
            operation_id: operation.operation_id.clone(),
            entity: operation.entity,
            action: operation.action,
            entity_id: operation.entity_id.clone(),
            resolved_entity_id: None,
            payload: operation.payload.clone(),
            client_timestamp: operation.client_timestamp,
            status: SyncStatus::Pending,
            error: None,
            attempts: 1,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }

    fn is_stale(&self, record: &SyncOperationRecord, now: DateTime<Utc>) -> bool {
        let window = i64::try_from(self.settings.stale_pending_after().as_millis())
            .unwrap_or(i64::MAX);
        (now - record.updated_at).num_milliseconds() >= window
    }

    /// Apply the effect and mark the record processed, atomically.
    fn apply_and_mark(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        operation: &SyncOperation,
    ) -> Result<OperationResult> {
        let mutation = Mutation::parse(operation.entity, operation.action, &operation.payload)?;
        let now = self.clock.now();
        let uow = db.begin()?;

        let entity_id = self.apply(&uow, ctx, operation, mutation, now)?;
        let payload = self.resolved_payload(&uow, &ctx.business_id, operation)?;
        let processed_at = self.next_processed_at(&uow, &ctx.business_id, now)?;
        self.repos.sync_operations.mark_processed(
            &uow,
            &ctx.business_id,
            &operation.operation_id,
            &entity_id,
            &payload,
            processed_at,
        )?;
        uow.commit()?;

        tracing::debug!(
            operation_id = %operation.operation_id,
            %entity_id,
            "Applied sync operation"
        );
        Ok(OperationResult::success(
            &operation.operation_id,
            entity_id,
            processed_at,
        ))
    }

    fn record_failure(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        operation: &SyncOperation,
        error: &Error,
    ) {
        let outcome = db.begin().and_then(|uow| {
            self.repos.sync_operations.mark_failed(
                &uow,
                &ctx.business_id,
                &operation.operation_id,
                &error.to_string(),
                self.clock.now(),
            )?;
            uow.commit()
        });
        if let Err(mark_error) = outcome {
            tracing::warn!(
                operation_id = %operation.operation_id,
                error = %mark_error,
                "Could not record sync failure"
            );
        }
    }

    /// The submitted payload with temporary references replaced by the
    /// server ids they were mapped to.
    fn resolved_payload(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        operation: &SyncOperation,
    ) -> Result<Value> {
        let references: &[(&str, EntityKind)] = match operation.entity {
            EntityKind::Sales => &[("customerId", EntityKind::Customers)],
            EntityKind::Payments => &[
                ("saleId", EntityKind::Sales),
                ("customerId", EntityKind::Customers),
            ],
            _ => &[],
        };

        let mut payload = operation.payload.clone();
        let Some(fields) = payload.as_object_mut() else {
            return Ok(payload);
        };
        for &(field, entity) in references {
            let Some(raw) = fields.get(field).and_then(Value::as_str).map(str::trim) else {
                continue;
            };
            if !is_temp_id(raw) {
                continue;
            }
            let mappings = &self.repos.id_mappings;
            if let Some(server_id) = mappings.resolve(uow, business_id, entity, raw)? {
                fields.insert(field.to_string(), Value::String(server_id));
            }
        }
        Ok(payload)
    }

    /// Processing times increase strictly per business so the change feed
    /// cursor never skips records.
    fn next_processed_at(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let now = millis_to_datetime(now.timestamp_millis());
        let last = self.repos.sync_operations.last_processed_at(uow, business_id)?;
        Ok(match last {
            Some(last) if last >= now => last + Duration::milliseconds(1),
            _ => now,
        })
    }

    fn apply(
        &self,
        uow: &UnitOfWork<'_>,
        ctx: &AuthContext,
        operation: &SyncOperation,
        mutation: Mutation,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let business_id = ctx.business_id.as_str();
        let now_ms = now.timestamp_millis();

        match mutation {
            Mutation::InsertCustomer(fields) => {
                let id: CustomerId = self.assign_id(uow, business_id, operation, now_ms)?;
                self.insert_customer(uow, business_id, id, fields, now_ms)?;
                Ok(id.as_str())
            }
            Mutation::UpdateCustomer(patch) => {
                let id: CustomerId = self.target_id(uow, business_id, operation)?;
                self.update_customer(uow, business_id, id, patch, now_ms)?;
                Ok(id.as_str())
            }
            Mutation::DeleteCustomer => {
                let id: CustomerId = self.target_id(uow, business_id, operation)?;
                self.repos.customers.delete(uow, business_id, &id, now_ms)?;
                Ok(id.as_str())
            }
            Mutation::InsertSale(fields) => {
                let id: SaleId = self.assign_id(uow, business_id, operation, now_ms)?;
                self.insert_sale(uow, ctx, id, fields, now_ms)?;
                Ok(id.as_str())
            }
            Mutation::DeleteSale => {
                let id: SaleId = self.target_id(uow, business_id, operation)?;
                self.repos.sales.delete(uow, business_id, &id)?;
                Ok(id.as_str())
            }
            Mutation::InsertPayment(fields) => {
                let id: PaymentId = self.assign_id(uow, business_id, operation, now_ms)?;
                self.insert_payment(uow, business_id, id, fields, operation, now_ms)?;
                Ok(id.as_str())
            }
            Mutation::UpdatePayment(patch) => {
                let id: PaymentId = self.target_id(uow, business_id, operation)?;
                self.update_payment(uow, business_id, id, patch, now_ms)?;
                Ok(id.as_str())
            }
            Mutation::DeletePayment => {
                let id: PaymentId = self.target_id(uow, business_id, operation)?;
                self.delete_payment(uow, business_id, id, now_ms)?;
                Ok(id.as_str())
            }
            Mutation::InsertDistribution(fields) => {
                let id: DistributionId = self.assign_id(uow, business_id, operation, now_ms)?;
                self.insert_distribution(uow, ctx, id, fields, now_ms)?;
                Ok(id.as_str())
            }
            Mutation::UpdateDistribution(patch) => {
                let id: DistributionId = self.target_id(uow, business_id, operation)?;
                self.update_distribution(uow, business_id, id, patch, now_ms)?;
                Ok(id.as_str())
            }
            Mutation::DeleteDistribution => {
                let id: DistributionId = self.target_id(uow, business_id, operation)?;
                self.repos
                    .distributions
                    .delete(uow, business_id, &id, now_ms)?;
                Ok(id.as_str())
            }
        }
    }

    /// Id for an inserted entity. A temporary id gets a fresh server id and
    /// a mapping so later operations can refer to it.
    fn assign_id<T: FromStr>(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        operation: &SyncOperation,
        now_ms: i64,
    ) -> Result<T> {
        if !is_temp_id(&operation.entity_id) {
            return parse_id(&operation.entity_id);
        }

        let mappings = &self.repos.id_mappings;
        if let Some(existing) =
            mappings.resolve(uow, business_id, operation.entity, &operation.entity_id)?
        {
            return Err(Error::validation(format!(
                "temporary id {} is already assigned to {existing}",
                operation.entity_id
            )));
        }

        let server_id = Uuid::now_v7().to_string();
        mappings.record(
            uow,
            business_id,
            operation.entity,
            &operation.entity_id,
            &server_id,
            now_ms,
        )?;
        parse_id(&server_id)
    }

    /// Id targeted by an update or delete
    fn target_id<T: FromStr>(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        operation: &SyncOperation,
    ) -> Result<T> {
        self.reference(uow, business_id, operation.entity, &operation.entity_id)
    }

    /// Resolve an id that may still be a device temporary id.
    fn reference<T: FromStr>(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        entity: EntityKind,
        raw: &str,
    ) -> Result<T> {
        let raw = raw.trim();
        if !is_temp_id(raw) {
            return parse_id(raw);
        }
        let server_id = self
            .repos
            .id_mappings
            .resolve(uow, business_id, entity, raw)?
            .ok_or_else(|| Error::not_found(format!("{entity} with temporary id {raw}")))?;
        parse_id(&server_id)
    }

    fn insert_customer(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: CustomerId,
        fields: CustomerFields,
        now_ms: i64,
    ) -> Result<()> {
        let mut customer = Customer::new(id, business_id, fields.name.trim(), now_ms);
        customer.phone = normalize_text_option(fields.phone);
        customer.address = normalize_text_option(fields.address);
        customer.notes = normalize_text_option(fields.notes);
        self.repos.customers.insert(uow, &customer)
    }

    fn update_customer(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: CustomerId,
        patch: CustomerPatch,
        now_ms: i64,
    ) -> Result<()> {
        let mut customer = self
            .repos
            .customers
            .get(uow, business_id, &id)?
            .ok_or_else(|| Error::not_found(format!("customer {id}")))?;

        if let Some(name) = patch.name {
            customer.name = name.trim().to_string();
        }
        if patch.phone.is_some() {
            customer.phone = normalize_text_option(patch.phone);
        }
        if patch.address.is_some() {
            customer.address = normalize_text_option(patch.address);
        }
        if patch.notes.is_some() {
            customer.notes = normalize_text_option(patch.notes);
        }
        customer.updated_at = now_ms;
        self.repos.customers.update(uow, &customer)
    }

    fn insert_sale(
        &self,
        uow: &UnitOfWork<'_>,
        ctx: &AuthContext,
        id: SaleId,
        fields: SaleFields,
        now_ms: i64,
    ) -> Result<()> {
        let business_id = ctx.business_id.as_str();
        let customer_id: CustomerId =
            self.reference(uow, business_id, EntityKind::Customers, &fields.customer_id)?;
        if self
            .repos
            .customers
            .get(uow, business_id, &customer_id)?
            .is_none()
        {
            return Err(Error::not_found(format!("customer {customer_id}")));
        }

        let items = fields
            .items
            .into_iter()
            .map(|item| SaleItem::new(item.variant_id.trim(), item.quantity, item.unit_price))
            .collect::<Result<Vec<_>>>()?;
        let total_amount = Sale::total_of(&items)?;

        let mut sale = Sale {
            id,
            business_id: business_id.to_string(),
            customer_id,
            seller_id: normalize_text_option(fields.seller_id)
                .unwrap_or_else(|| ctx.user_id.clone()),
            order_id: None,
            sale_date: fields.sale_date.unwrap_or_else(|| self.clock.today()),
            total_amount,
            amount_paid: 0,
            balance_due: total_amount,
            items,
            created_at: now_ms,
            is_deleted: false,
        };
        sale.settle(fields.amount_paid)?;
        self.repos.sales.insert(uow, &sale)
    }

    fn load_sale(&self, uow: &UnitOfWork<'_>, business_id: &str, id: &SaleId) -> Result<Sale> {
        self.repos
            .sales
            .get(uow, business_id, id)?
            .ok_or_else(|| Error::not_found(format!("sale {id}")))
    }

    /// Move a sale's paid amount by `delta` and persist it.
    fn adjust_paid(&self, uow: &UnitOfWork<'_>, sale: &mut Sale, delta: i64) -> Result<()> {
        let paid = sale
            .amount_paid
            .checked_add(delta)
            .ok_or_else(|| Error::validation("payment amount overflows"))?;
        sale.settle(paid)?;
        self.repos.sales.update_settlement(uow, sale)
    }

    fn insert_payment(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: PaymentId,
        fields: PaymentFields,
        operation: &SyncOperation,
        now_ms: i64,
    ) -> Result<()> {
        let sale_id: SaleId =
            self.reference(uow, business_id, EntityKind::Sales, &fields.sale_id)?;
        let customer_id = fields
            .customer_id
            .map(|raw| self.reference::<CustomerId>(uow, business_id, EntityKind::Customers, &raw))
            .transpose()?;

        let mut sale = self.load_sale(uow, business_id, &sale_id)?;
        self.adjust_paid(uow, &mut sale, fields.amount)?;

        let payment = Payment {
            id,
            business_id: business_id.to_string(),
            sale_id,
            customer_id: customer_id.or(Some(sale.customer_id)),
            amount: fields.amount,
            method: fields.method,
            reference: normalize_text_option(fields.reference),
            paid_at: fields
                .paid_at
                .unwrap_or(operation.client_timestamp)
                .timestamp_millis(),
            created_at: now_ms,
            updated_at: now_ms,
            is_deleted: false,
        };
        self.repos.payments.insert(uow, &payment)
    }

    fn load_payment(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: &PaymentId,
    ) -> Result<Payment> {
        self.repos
            .payments
            .get(uow, business_id, id)?
            .ok_or_else(|| Error::not_found(format!("payment {id}")))
    }

    fn update_payment(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: PaymentId,
        patch: PaymentPatch,
        now_ms: i64,
    ) -> Result<()> {
        let mut payment = self.load_payment(uow, business_id, &id)?;

        if let Some(amount) = patch.amount {
            let mut sale = self.load_sale(uow, business_id, &payment.sale_id)?;
            self.adjust_paid(uow, &mut sale, amount - payment.amount)?;
            payment.amount = amount;
        }
        if let Some(method) = patch.method {
            payment.method = method;
        }
        if patch.reference.is_some() {
            payment.reference = normalize_text_option(patch.reference);
        }
        if let Some(paid_at) = patch.paid_at {
            payment.paid_at = paid_at.timestamp_millis();
        }
        payment.updated_at = now_ms;
        self.repos.payments.update(uow, &payment)
    }

    fn delete_payment(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: PaymentId,
        now_ms: i64,
    ) -> Result<()> {
        let payment = self.load_payment(uow, business_id, &id)?;
        // A deleted sale keeps its settlement as it was
        if let Some(mut sale) = self.repos.sales.get(uow, business_id, &payment.sale_id)? {
            self.adjust_paid(uow, &mut sale, -payment.amount)?;
        }
        self.repos.payments.delete(uow, business_id, &id, now_ms)
    }

    fn insert_distribution(
        &self,
        uow: &UnitOfWork<'_>,
        ctx: &AuthContext,
        id: DistributionId,
        fields: DistributionFields,
        now_ms: i64,
    ) -> Result<()> {
        let distribution = Distribution {
            id,
            business_id: ctx.business_id.clone(),
            seller_id: normalize_text_option(fields.seller_id)
                .unwrap_or_else(|| ctx.user_id.clone()),
            variant_id: fields.variant_id.trim().to_string(),
            quantity: fields.quantity,
            distribution_date: fields.distribution_date,
            notes: normalize_text_option(fields.notes),
            created_at: now_ms,
            updated_at: now_ms,
            is_deleted: false,
        };
        self.repos.distributions.insert(uow, &distribution)
    }

    fn update_distribution(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: DistributionId,
        patch: DistributionPatch,
        now_ms: i64,
    ) -> Result<()> {
        let mut distribution = self
            .repos
            .distributions
            .get(uow, business_id, &id)?
            .ok_or_else(|| Error::not_found(format!("distribution {id}")))?;

        if let Some(seller_id) = normalize_text_option(patch.seller_id) {
            distribution.seller_id = seller_id;
        }
        if let Some(variant_id) = patch.variant_id {
            distribution.variant_id = variant_id.trim().to_string();
        }
        if let Some(quantity) = patch.quantity {
            distribution.quantity = quantity;
        }
        if let Some(date) = patch.distribution_date {
            distribution.distribution_date = date;
        }
        if patch.notes.is_some() {
            distribution.notes = normalize_text_option(patch.notes);
        }
        distribution.updated_at = now_ms;
        self.repos.distributions.update(uow, &distribution)
    }
}

fn parse_id<T: FromStr>(raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::validation(format!("invalid id '{raw}'")))
}
