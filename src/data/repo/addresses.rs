use std::sync::{Mutex, PoisonError};

use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Double, Integer, Nullable, Text};
use log::{debug, info, warn};

use crate::data::error::RepoResult;
use crate::data::models::{Address, AddressRow, CoordinateSystem, NextId, PointRow, TextRow};
use crate::data::repair;
use crate::db::Pool;

/// Rows returned per call of `find_malformed_addresses`.
pub const MALFORMED_BATCH_SIZE: i64 = 5;

const SQL_NEXT_ID: &str = "SELECT nextval('seq_signalement_adresse_id_adresse') AS id";

const SQL_INSERT: &str = "INSERT INTO signalement_adresse \
    (id_adresse, adresse, precision_localisation, fk_id_signalement, geom) \
    VALUES ($1, $2, $3, $4, ST_Transform(ST_SetSRID(ST_MakePoint($5, $6), $7), 4326))";

const SQL_UPDATE: &str = "UPDATE signalement_adresse SET \
    adresse = $1, \
    precision_localisation = $2, \
    fk_id_signalement = $3, \
    geom = ST_Transform(ST_SetSRID(ST_MakePoint($4, $5), $6), 4326) \
    WHERE id_adresse = $7";

const SQL_SELECT: &str = "SELECT id_adresse, adresse, ST_X(geom) AS lng, ST_Y(geom) AS lat, \
    precision_localisation, fk_id_signalement, is_adresse_rattrapee \
    FROM signalement_adresse";

const SQL_SELECT_MALFORMED: &str = "SELECT id_adresse, adresse, \
    ST_X(ST_Transform(geom, 2154)) AS lng, ST_Y(ST_Transform(geom, 2154)) AS lat, \
    precision_localisation, fk_id_signalement, is_adresse_rattrapee \
    FROM signalement_adresse \
    WHERE (adresse NOT SIMILAR TO '%75[0-9]{3} PARIS' \
        OR adresse = '' \
        OR adresse IS NULL \
        OR adresse SIMILAR TO '%, Paris, France, 75[0-9]{3} PARIS') \
    AND is_adresse_rattrapee IS FALSE \
    ORDER BY id_adresse \
    LIMIT $1";

const SQL_SELECT_POINT: &str = "SELECT ST_X(geom) AS lng, ST_Y(geom) AS lat \
    FROM signalement_adresse WHERE id_adresse = $1";

/// Candidates are read in pages of this size, keyed on `id_adresse`.
pub(crate) const REPAIR_PAGE_SIZE: i64 = 500;

const SQL_SELECT_REPAIR_CANDIDATES: &str = "SELECT id_adresse, adresse \
    FROM signalement_adresse WHERE id_adresse > $1 AND ";

const ARRONDISSEMENT_CANDIDATES: &str = "adresse ILIKE '%arrondissement%'";

const CITY_NAME_CANDIDATES: &str = "adresse ILIKE '%parigi%'";

// Rows with a comma before any code are already fixed.
const POSTAL_CODE_COMMA_CANDIDATES: &str = "adresse SIMILAR TO '% 75[0-9]{3}%' \
    AND adresse NOT SIMILAR TO '%, 75[0-9]{3}%' \
    AND adresse NOT SIMILAR TO '%,75[0-9]{3}%'";

/// Persistence of the addresses attached to incident reports.
///
/// Every call checks a connection out of the pool for its own duration; each
/// statement is its own unit of work.
pub struct AddressRepository {
    pool: Pool,
    // Serializes id assignment and insert.
    insert_lock: Mutex<()>,
}

impl AddressRepository {
    pub fn new(pool: Pool) -> AddressRepository {
        AddressRepository {
            pool,
            insert_lock: Mutex::new(()),
        }
    }

    /// Inserts the address if it has no id yet, assigning a fresh one from the
    /// sequence. An address that already has an id is not written at all.
    pub fn insert(&self, address: &mut Address) -> RepoResult<i64> {
        if address.has_id() {
            let id = address.id.unwrap_or_default();
            debug!("Address {} already inserted, skipping", id);
            return Ok(id);
        }

        // Lock before checkout so waiting inserters do not hold connections.
        let _guard = self.insert_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = self.pool.get()?;

        let id = next_id(&conn)?;
        sql_query(SQL_INSERT)
            .bind::<BigInt, _>(id)
            .bind::<Nullable<Text>, _>(address.text.as_deref())
            .bind::<Nullable<Text>, _>(address.location_precision.as_deref())
            .bind::<Nullable<BigInt>, _>(address.report_id())
            .bind::<Double, _>(address.longitude)
            .bind::<Double, _>(address.latitude)
            .bind::<Integer, _>(address.coordinate_system.srid())
            .execute(&conn)?;

        address.id = Some(id);
        debug!("Inserted address {} for report {:?}", id, address.report_id());
        Ok(id)
    }

    /// Deleting an id that does not exist is not an error.
    pub fn remove(&self, id: i64) -> RepoResult<()> {
        use crate::data::schema::signalement_adresse::dsl::*;

        let conn = self.pool.get()?;
        let deleted = diesel::delete(signalement_adresse.filter(id_adresse.eq(id)))
            .execute(&conn)?;

        debug!("Removed address {} ({} row(s))", id, deleted);
        Ok(())
    }

    pub fn load(&self, id: i64) -> RepoResult<Option<Address>> {
        let conn = self.pool.get()?;
        let row = sql_query(format!("{} WHERE id_adresse = $1", SQL_SELECT))
            .bind::<BigInt, _>(id)
            .get_result::<AddressRow>(&conn)
            .optional()?;

        Ok(row.map(|r| r.into_address(CoordinateSystem::Wgs84)))
    }

    /// First address (lowest id) attached to the report.
    pub fn load_by_report_id(&self, report_id: i64) -> RepoResult<Option<Address>> {
        Ok(self.find_by_report_id(report_id)?.into_iter().next())
    }

    pub fn find_by_report_id(&self, report_id: i64) -> RepoResult<Vec<Address>> {
        let conn = self.pool.get()?;
        let rows = sql_query(format!("{} WHERE fk_id_signalement = $1 ORDER BY id_adresse", SQL_SELECT))
            .bind::<BigInt, _>(report_id)
            .load::<AddressRow>(&conn)?;

        Ok(rows
            .into_iter()
            .map(|r| r.into_address(CoordinateSystem::Wgs84))
            .collect())
    }

    /// Overwrites text, precision, report and geometry of the row with the
    /// address's id. The correction flag is never written here.
    pub fn update(&self, address: &Address) -> RepoResult<()> {
        let conn = self.pool.get()?;
        let updated = sql_query(SQL_UPDATE)
            .bind::<Nullable<Text>, _>(address.text.as_deref())
            .bind::<Nullable<Text>, _>(address.location_precision.as_deref())
            .bind::<Nullable<BigInt>, _>(address.report_id())
            .bind::<Double, _>(address.longitude)
            .bind::<Double, _>(address.latitude)
            .bind::<Integer, _>(address.coordinate_system.srid())
            .bind::<Nullable<BigInt>, _>(address.id)
            .execute(&conn)?;

        debug!("Updated address {:?} ({} row(s))", address.id, updated);
        Ok(())
    }

    /// Replaces only the text and marks the address as corrected.
    pub fn update_address_text(&self, address: &Address) -> RepoResult<()> {
        use crate::data::schema::signalement_adresse::dsl::*;

        let conn = self.pool.get()?;
        let updated = diesel::update(signalement_adresse.filter(id_adresse.nullable().eq(address.id)))
            .set((
                adresse.eq(address.text.as_deref()),
                is_adresse_rattrapee.eq(true),
            ))
            .execute(&conn)?;

        debug!("Corrected text of address {:?} ({} row(s))", address.id, updated);
        Ok(())
    }

    /// Up to `MALFORMED_BATCH_SIZE` uncorrected addresses whose text does not
    /// end with a Paris postal code and city.
    ///
    /// Coordinates come back in Lambert-93 (EPSG:2154), tagged as such; use
    /// `convert_lambert93_to_wgs84` to get the stored WGS84 values back.
    pub fn find_malformed_addresses(&self) -> RepoResult<Vec<Address>> {
        let conn = self.pool.get()?;
        let rows = sql_query(SQL_SELECT_MALFORMED)
            .bind::<BigInt, _>(MALFORMED_BATCH_SIZE)
            .load::<AddressRow>(&conn)?;

        Ok(rows
            .into_iter()
            .map(|r| r.into_address(CoordinateSystem::Lambert93))
            .collect())
    }

    /// Reloads the stored WGS84 coordinates into `address`. No transform is
    /// computed here: the table only holds EPSG:4326 points.
    ///
    /// Addresses without id, or without a matching row, are left untouched.
    pub fn convert_lambert93_to_wgs84(&self, address: &mut Address) -> RepoResult<()> {
        let id = match address.id {
            Some(id) => id,
            None => return Ok(()),
        };

        let conn = self.pool.get()?;
        let point = sql_query(SQL_SELECT_POINT)
            .bind::<BigInt, _>(id)
            .get_result::<PointRow>(&conn)
            .optional()?;

        if let Some(point) = point {
            address.longitude = point.lng;
            address.latitude = point.lat;
            address.coordinate_system = CoordinateSystem::Wgs84;
        }
        Ok(())
    }

    pub fn repair_arrondissement_syntax(&self) -> RepoResult<()> {
        self.repair_texts("arrondissement", ARRONDISSEMENT_CANDIDATES, repair::fix_arrondissement_syntax)
    }

    pub fn repair_city_name(&self) -> RepoResult<()> {
        self.repair_texts("city name", CITY_NAME_CANDIDATES, repair::fix_city_name)
    }

    pub fn repair_missing_comma_before_postal_code(&self) -> RepoResult<()> {
        self.repair_texts("postal code comma", POSTAL_CODE_COMMA_CANDIDATES, repair::fix_missing_comma_before_postal_code)
    }

    /// Walks the rows matching the SQL condition `filter` page by page,
    /// applies `fix` to each text and writes back the ones it changed.
    fn repair_texts<F>(&self, name: &str, filter: &str, fix: F) -> RepoResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let conn = self.pool.get()?;
        let query = format!("{}{} ORDER BY id_adresse LIMIT $2", SQL_SELECT_REPAIR_CANDIDATES, filter);

        let mut last_id = 0;
        let mut scanned = 0;
        let mut rewritten = 0;
        loop {
            let page = sql_query(query.as_str())
                .bind::<BigInt, _>(last_id)
                .bind::<BigInt, _>(REPAIR_PAGE_SIZE)
                .load::<TextRow>(&conn)?;

            for candidate in &page {
                let current = match candidate.adresse.as_deref() {
                    Some(text) => text,
                    None => continue,
                };
                if let Some(fixed) = fix(current) {
                    if write_repaired_text(&conn, candidate.id_adresse, current, &fixed)? {
                        rewritten += 1;
                    } else {
                        warn!("Address {} changed during {} repair, skipped", candidate.id_adresse, name);
                    }
                }
            }

            scanned += page.len();
            match page.last() {
                Some(row) if page.len() as i64 == REPAIR_PAGE_SIZE => last_id = row.id_adresse,
                _ => break,
            }
        }

        info!("{} repair: {} of {} candidate address(es) rewritten", name, rewritten, scanned);
        Ok(())
    }
}

fn next_id(conn: &PgConnection) -> RepoResult<i64> {
    let next = sql_query(SQL_NEXT_ID).get_result::<NextId>(conn)?;
    Ok(next.id)
}

/// Only writes if the text is still `previous`. Returns whether a row was updated.
pub(crate) fn write_repaired_text(
    conn: &PgConnection,
    id: i64,
    previous: &str,
    fixed: &str
) -> RepoResult<bool> {
    use crate::data::schema::signalement_adresse::dsl::*;

    let updated = diesel::update(
        signalement_adresse
            .filter(id_adresse.eq(id))
            .filter(adresse.eq(previous))
    )
        .set(adresse.eq(fixed))
        .execute(conn)?;

    Ok(updated > 0)
}
