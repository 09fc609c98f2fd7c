use chrono::{DateTime, Utc};
use cruise_shared::{Hold, InventoryAuditEntry, InventoryRecord, PricePoint};
use diesel::prelude::*;
use uuid::Uuid;

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::inventories)]
pub struct InventoryRow {
    pub product_id: Uuid,
    pub total: i32,
    pub locked: i32,
    pub sold: i32,
    pub updated_at: DateTime<Utc>,
}

impl From<InventoryRow> for InventoryRecord {
    fn from(row: InventoryRow) -> Self {
        Self {
            product_id: row.product_id,
            total: row.total,
            locked: row.locked,
            sold: row.sold,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::inventory_audit_log)]
pub struct AuditRow {
    pub id: i64,
    pub product_id: Uuid,
    pub change: i32,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::inventory_audit_log)]
pub struct NewAuditRow<'a> {
    pub product_id: Uuid,
    pub change: i32,
    pub reason: &'a str,
    pub created_at: DateTime<Utc>,
}

impl From<AuditRow> for InventoryAuditEntry {
    fn from(row: AuditRow) -> Self {
        Self {
            product_id: row.product_id,
            change: row.change,
            reason: row.reason,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::cabin_holds)]
pub struct HoldRow {
    pub id: Uuid,
    pub product_id: Uuid,
    pub customer_id: Uuid,
    pub qty: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&Hold> for HoldRow {
    fn from(hold: &Hold) -> Self {
        Self {
            id: hold.id,
            product_id: hold.product_id,
            customer_id: hold.customer_id,
            qty: hold.qty,
            expires_at: hold.expires_at,
            created_at: hold.created_at,
        }
    }
}

impl From<HoldRow> for Hold {
    fn from(row: HoldRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            customer_id: row.customer_id,
            qty: row.qty,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Queryable)]
#[diesel(table_name = crate::schema::cabin_prices)]
pub struct PriceRow {
    pub id: i64,
    pub product_id: Uuid,
    pub calendar_date: DateTime<Utc>,
    pub occupancy: i32,
    pub unit_price: i64,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::cabin_prices)]
pub struct NewPriceRow {
    pub product_id: Uuid,
    pub calendar_date: DateTime<Utc>,
    pub occupancy: i32,
    pub unit_price: i64,
}

impl From<PriceRow> for PricePoint {
    fn from(row: PriceRow) -> Self {
        Self {
            product_id: row.product_id,
            calendar_date: row.calendar_date,
            occupancy: row.occupancy,
            unit_price: row.unit_price,
        }
    }
}
