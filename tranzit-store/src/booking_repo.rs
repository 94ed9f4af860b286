use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use tranzit_core::repository::{
    BookingFilter, BookingGuard, BookingUpdate, RecordStore, ResourcePredicate, StoreError, StoreResult,
};
use tranzit_core::{Booking, Customer, Driver, DriverStatus, Vehicle, VehicleStatus};

/// Postgres-backed record store. Every conditional update is one `UPDATE ... WHERE`
/// statement so the predicate is evaluated by the database at write time.
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => StoreError::Unavailable(err.to_string()),
        other => StoreError::Backend(Box::new(other)),
    }
}

fn status_names<S: AsRef<str>>(statuses: impl IntoIterator<Item = S>) -> Vec<String> {
    statuses.into_iter().map(|s| s.as_ref().to_string()).collect()
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    booking_number: i64,
    customer_id: Uuid,
    driver_id: Option<Uuid>,
    vehicle_id: Option<Uuid>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            booking_number: row.booking_number,
            customer_id: row.customer_id,
            driver_id: row.driver_id,
            vehicle_id: row.vehicle_id,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DriverRow {
    id: Uuid,
    full_name: String,
    phone: Option<String>,
    vehicle_id: Option<Uuid>,
    status: String,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct VehicleRow {
    id: Uuid,
    plate_number: String,
    model: Option<String>,
    status: String,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: Uuid,
    full_name: String,
    messaging_id: Option<String>,
}

const BOOKING_COLUMNS: &str =
    "id, booking_number, customer_id, driver_id, vehicle_id, status, created_at, updated_at";

const BOOKING_FILTER: &str = r#"
    ($1::uuid IS NULL OR driver_id = $1)
    AND ($2::uuid IS NULL OR vehicle_id = $2)
    AND (cardinality($3::text[]) = 0 OR status = ANY($3))
"#;

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(Booking::try_from).transpose()
    }

    async fn update_booking_if(
        &self,
        id: Uuid,
        guard: &BookingGuard,
        update: &BookingUpdate,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $1,
                driver_id = COALESCE($2, driver_id),
                vehicle_id = COALESCE($3, vehicle_id),
                updated_at = $4
            WHERE id = $5
              AND status = $6
              AND ($7::uuid IS NULL OR driver_id = $7)
              AND ($8::uuid IS NULL OR customer_id = $8)
            "#,
        )
        .bind(update.status.as_str())
        .bind(update.assignment.map(|a| a.driver_id))
        .bind(update.assignment.map(|a| a.vehicle_id))
        .bind(update.updated_at)
        .bind(id)
        .bind(guard.status.as_str())
        .bind(guard.driver_id)
        .bind(guard.customer_id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected())
    }

    async fn query_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE {} ORDER BY booking_number",
            BOOKING_COLUMNS, BOOKING_FILTER
        ))
        .bind(filter.driver_id)
        .bind(filter.vehicle_id)
        .bind(status_names(filter.statuses.iter().map(|s| s.as_str())))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn count_bookings(&self, filter: &BookingFilter) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM bookings WHERE {}",
            BOOKING_FILTER
        ))
        .bind(filter.driver_id)
        .bind(filter.vehicle_id)
        .bind(status_names(filter.statuses.iter().map(|s| s.as_str())))
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        Ok(count as u64)
    }

    async fn find_driver(&self, id: Uuid) -> StoreResult<Option<Driver>> {
        let row = sqlx::query_as::<_, DriverRow>(
            "SELECT id, full_name, phone, vehicle_id, status, updated_at FROM drivers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => Ok(Some(Driver {
                id: row.id,
                full_name: row.full_name,
                phone: row.phone,
                vehicle_id: row.vehicle_id,
                status: row.status.parse()?,
                updated_at: row.updated_at,
            })),
            None => Ok(None),
        }
    }

    async fn update_driver_if(
        &self,
        id: Uuid,
        predicate: &ResourcePredicate<DriverStatus>,
        status: DriverStatus,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE drivers
            SET status = $1, updated_at = NOW()
            WHERE id = $2
              AND status = ANY($3)
              AND NOT EXISTS (
                  SELECT 1 FROM bookings b WHERE b.driver_id = $2 AND b.status = ANY($4)
              )
            "#,
        )
        .bind(status.as_str())
        .bind(id)
        .bind(status_names(predicate.statuses.iter().map(|s| s.as_str())))
        .bind(status_names(predicate.without_bookings_in.iter().map(|s| s.as_str())))
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected())
    }

    async fn find_vehicle(&self, id: Uuid) -> StoreResult<Option<Vehicle>> {
        let row = sqlx::query_as::<_, VehicleRow>(
            "SELECT id, plate_number, model, status, updated_at FROM vehicles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => Ok(Some(Vehicle {
                id: row.id,
                plate_number: row.plate_number,
                model: row.model,
                status: row.status.parse()?,
                updated_at: row.updated_at,
            })),
            None => Ok(None),
        }
    }

    async fn update_vehicle_if(
        &self,
        id: Uuid,
        predicate: &ResourcePredicate<VehicleStatus>,
        status: VehicleStatus,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE vehicles
            SET status = $1, updated_at = NOW()
            WHERE id = $2
              AND status = ANY($3)
              AND NOT EXISTS (
                  SELECT 1 FROM bookings b WHERE b.vehicle_id = $2 AND b.status = ANY($4)
              )
            "#,
        )
        .bind(status.as_str())
        .bind(id)
        .bind(status_names(predicate.statuses.iter().map(|s| s.as_str())))
        .bind(status_names(predicate.without_bookings_in.iter().map(|s| s.as_str())))
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected())
    }

    async fn find_customer(&self, id: Uuid) -> StoreResult<Option<Customer>> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, full_name, messaging_id FROM customers WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|r| Customer {
            id: r.id,
            full_name: r.full_name,
            messaging_id: r.messaging_id,
        }))
    }
}
