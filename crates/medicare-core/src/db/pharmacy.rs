//! Pharmacy, medicine and stock ledger operations.

use chrono::{Duration, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, warn};

use super::{Database, DbError, DbResult};
use crate::models::{Medicine, Pharmacy, StockEntry, StockEntryType, DATE_FORMAT};

const PHARMACY_COLUMNS: &str = r#"
    id, user_id, display_id, name, license_number, drug_license_number, gstin,
    owner_name, address, city, state, pincode, location_lat, location_lng, phone,
    email, operating_hours, is_verified, is_active, rating, home_delivery_available,
    minimum_order_amount, total_orders, created_at, updated_at
"#;

const MEDICINE_COLUMNS: &str = r#"
    m.id, m.pharmacy_id, m.name, m.generic_name, m.manufacturer, m.composition,
    m.dosage, m.category, m.description, m.mrp, m.selling_price, m.discount_percentage,
    m.stock_quantity, m.reorder_level, m.requires_prescription, m.is_controlled_substance,
    m.schedule_type, m.expiry_date, m.batch_number, m.is_available, m.created_at, m.updated_at
"#;

impl Database {
    // ------------------------------------------------------------------------
    // Pharmacies
    // ------------------------------------------------------------------------

    pub fn insert_pharmacy(&self, pharmacy: &mut Pharmacy) -> DbResult<i64> {
        let hours_json = serde_json::to_string(&pharmacy.operating_hours)?;

        self.conn.execute(
            r#"
            INSERT INTO pharmacies (
                user_id, display_id, name, license_number, drug_license_number, gstin,
                owner_name, address, city, state, pincode, location_lat, location_lng,
                phone, email, operating_hours, is_verified, is_active, rating,
                home_delivery_available, minimum_order_amount, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)
            "#,
            params![
                pharmacy.user_id,
                pharmacy.display_id,
                pharmacy.name,
                pharmacy.license_number,
                pharmacy.drug_license_number,
                pharmacy.gstin,
                pharmacy.owner_name,
                pharmacy.address,
                pharmacy.city,
                pharmacy.state,
                pharmacy.pincode,
                pharmacy.location_lat,
                pharmacy.location_lng,
                pharmacy.phone,
                pharmacy.email,
                hours_json,
                pharmacy.is_verified,
                pharmacy.is_active,
                pharmacy.rating,
                pharmacy.home_delivery_available,
                pharmacy.minimum_order_amount,
                pharmacy.created_at,
                pharmacy.updated_at,
            ],
        )?;
        pharmacy.id = self.conn.last_insert_rowid();
        Ok(pharmacy.id)
    }

    pub fn get_pharmacy(&self, id: i64) -> DbResult<Option<Pharmacy>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM pharmacies WHERE id = ?", PHARMACY_COLUMNS),
                [id],
                read_pharmacy_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    pub fn get_pharmacy_by_display_id(&self, display_id: &str) -> DbResult<Option<Pharmacy>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM pharmacies WHERE display_id = ?", PHARMACY_COLUMNS),
                [display_id],
                read_pharmacy_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Mark a pharmacy as verified by an administrator.
    pub fn verify_pharmacy(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE pharmacies SET is_verified = 1, updated_at = datetime('now') WHERE id = ?",
            [id],
        )?;
        Ok(rows_affected > 0)
    }

    // ------------------------------------------------------------------------
    // Medicines
    // ------------------------------------------------------------------------

    /// Insert a medicine. A non-zero `stock_quantity` is booked as an
    /// opening `purchase` entry so the ledger accounts for all stock.
    pub fn insert_medicine(&self, medicine: &mut Medicine) -> DbResult<i64> {
        let tx = self.begin()?;
        let id = insert_medicine_with_opening_stock(&tx, medicine)?;
        tx.commit()?;
        Ok(id)
    }

    pub fn get_medicine(&self, id: i64) -> DbResult<Option<Medicine>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM medicines m WHERE m.id = ?", MEDICINE_COLUMNS),
                [id],
                read_medicine,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Update catalog fields. Stock only moves through the ledger.
    pub fn update_medicine(&self, medicine: &Medicine) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE medicines SET
                name = ?2,
                generic_name = ?3,
                manufacturer = ?4,
                composition = ?5,
                dosage = ?6,
                category = ?7,
                description = ?8,
                mrp = ?9,
                selling_price = ?10,
                discount_percentage = ?11,
                reorder_level = ?12,
                requires_prescription = ?13,
                is_controlled_substance = ?14,
                schedule_type = ?15,
                expiry_date = ?16,
                batch_number = ?17,
                is_available = ?18,
                updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![
                medicine.id,
                medicine.name,
                medicine.generic_name,
                medicine.manufacturer,
                medicine.composition,
                medicine.dosage,
                medicine.category,
                medicine.description,
                medicine.mrp,
                medicine.selling_price,
                medicine.discount_percentage,
                medicine.reorder_level,
                medicine.requires_prescription,
                medicine.is_controlled_substance,
                medicine.schedule_type,
                medicine.expiry_date,
                medicine.batch_number,
                medicine.is_available,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Delete a medicine. Fails with a foreign-key violation once it has
    /// order history.
    pub fn delete_medicine(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM medicines WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    pub fn list_medicines_for_pharmacy(&self, pharmacy_id: i64) -> DbResult<Vec<Medicine>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM medicines m WHERE m.pharmacy_id = ? ORDER BY m.name",
            MEDICINE_COLUMNS
        ))?;
        let rows = stmt.query_map([pharmacy_id], read_medicine)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Search available medicines using FTS5 (BM25 ranking) over name,
    /// generic name and composition.
    pub fn search_medicines(&self, query: &str, limit: usize) -> DbResult<Vec<Medicine>> {
        let escaped_query = escape_fts_query(query);
        if escaped_query.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}, bm25(medicines_fts) AS rank
            FROM medicines m
            JOIN medicines_fts fts ON m.id = fts.rowid
            WHERE medicines_fts MATCH ?1
              AND m.is_available = 1
            ORDER BY rank
            LIMIT ?2
            "#,
            MEDICINE_COLUMNS
        ))?;

        let rows = stmt.query_map(params![escaped_query, limit as i64], read_medicine)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Medicines at or below their reorder level.
    pub fn list_low_stock_medicines(&self, pharmacy_id: i64) -> DbResult<Vec<Medicine>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM medicines m
            WHERE m.pharmacy_id = ? AND m.stock_quantity <= m.reorder_level
            ORDER BY m.stock_quantity, m.name
            "#,
            MEDICINE_COLUMNS
        ))?;
        let rows = stmt.query_map([pharmacy_id], read_medicine)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Medicines expiring between `today` and `today + days`, both inclusive,
    /// soonest first. Already expired stock is not listed.
    pub fn list_expiring_medicines(
        &self,
        pharmacy_id: i64,
        today: NaiveDate,
        days: i64,
    ) -> DbResult<Vec<Medicine>> {
        let from = today.format(DATE_FORMAT).to_string();
        let until = (today + Duration::days(days)).format(DATE_FORMAT).to_string();

        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM medicines m
            WHERE m.pharmacy_id = ?1 AND m.expiry_date >= ?2 AND m.expiry_date <= ?3
            ORDER BY m.expiry_date, m.name
            "#,
            MEDICINE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![pharmacy_id, from, until], read_medicine)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ------------------------------------------------------------------------
    // Stock ledger
    // ------------------------------------------------------------------------

    /// Append a stock movement and apply it to `stock_quantity`.
    pub fn record_stock_entry(&self, entry: &mut StockEntry) -> DbResult<i64> {
        let tx = self.begin()?;
        let id = apply_stock_entry(&tx, entry)?;
        tx.commit()?;
        Ok(id)
    }

    /// Ledger for a medicine, oldest first.
    pub fn list_stock_entries(&self, medicine_id: i64) -> DbResult<Vec<StockEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, medicine_id, pharmacy_id, entry_type, quantity, reference_id,
                   batch_number, expiry_date, supplier_name, purchase_price_per_unit,
                   invoice_number, created_at
            FROM stock_entries
            WHERE medicine_id = ?
            ORDER BY id
            "#,
        )?;

        let rows = stmt.query_map([medicine_id], |row| {
            Ok(StockEntryRow {
                id: row.get(0)?,
                medicine_id: row.get(1)?,
                pharmacy_id: row.get(2)?,
                entry_type: row.get(3)?,
                quantity: row.get(4)?,
                reference_id: row.get(5)?,
                batch_number: row.get(6)?,
                expiry_date: row.get(7)?,
                supplier_name: row.get(8)?,
                purchase_price_per_unit: row.get(9)?,
                invoice_number: row.get(10)?,
                created_at: row.get(11)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.try_into()?);
        }
        Ok(entries)
    }
}

pub(crate) fn insert_medicine_with_opening_stock(conn: &Connection, medicine: &mut Medicine) -> DbResult<i64> {
    if medicine.stock_quantity < 0 {
        return Err(DbError::InvalidState(format!(
            "opening stock for '{}' is negative",
            medicine.name
        )));
    }

    conn.execute(
        r#"
        INSERT INTO medicines (
            pharmacy_id, name, generic_name, manufacturer, composition, dosage,
            category, description, mrp, selling_price, discount_percentage,
            stock_quantity, reorder_level, requires_prescription, is_controlled_substance,
            schedule_type, expiry_date, batch_number, is_available, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
        "#,
        params![
            medicine.pharmacy_id,
            medicine.name,
            medicine.generic_name,
            medicine.manufacturer,
            medicine.composition,
            medicine.dosage,
            medicine.category,
            medicine.description,
            medicine.mrp,
            medicine.selling_price,
            medicine.discount_percentage,
            medicine.reorder_level,
            medicine.requires_prescription,
            medicine.is_controlled_substance,
            medicine.schedule_type,
            medicine.expiry_date,
            medicine.batch_number,
            medicine.is_available,
            medicine.created_at,
            medicine.updated_at,
        ],
    )?;
    medicine.id = conn.last_insert_rowid();

    if medicine.stock_quantity > 0 {
        let mut opening = StockEntry::new(
            medicine.id,
            medicine.pharmacy_id,
            StockEntryType::Purchase,
            medicine.stock_quantity,
        );
        opening.batch_number = Some(medicine.batch_number.clone());
        opening.expiry_date = Some(medicine.expiry_date.clone());
        opening.reference_id = Some("opening-stock".into());
        apply_stock_entry(conn, &mut opening)?;
    }

    Ok(medicine.id)
}

/// Insert a ledger row and move `medicines.stock_quantity` by its delta.
///
/// Runs on the caller's connection or transaction. Stock never goes
/// below zero.
pub(crate) fn apply_stock_entry(conn: &Connection, entry: &mut StockEntry) -> DbResult<i64> {
    let (pharmacy_id, available): (i64, i64) = conn
        .query_row(
            "SELECT pharmacy_id, stock_quantity FROM medicines WHERE id = ?",
            [entry.medicine_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("medicine {}", entry.medicine_id)))?;

    if pharmacy_id != entry.pharmacy_id {
        return Err(DbError::InvalidState(format!(
            "medicine {} is not stocked by pharmacy {}",
            entry.medicine_id, entry.pharmacy_id
        )));
    }

    let delta = entry.entry_type.stock_delta(entry.quantity);
    if entry.quantity > 0 && available + delta < 0 {
        warn!(
            medicine_id = entry.medicine_id,
            available,
            requested = entry.quantity,
            "rejected stock movement"
        );
        return Err(DbError::InsufficientStock {
            medicine_id: entry.medicine_id,
            available,
            requested: entry.quantity,
        });
    }

    // quantity > 0 is enforced by CHECK here, before stock moves
    conn.execute(
        r#"
        INSERT INTO stock_entries (
            medicine_id, pharmacy_id, entry_type, quantity, reference_id, batch_number,
            expiry_date, supplier_name, purchase_price_per_unit, invoice_number, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            entry.medicine_id,
            entry.pharmacy_id,
            entry.entry_type.as_str(),
            entry.quantity,
            entry.reference_id,
            entry.batch_number,
            entry.expiry_date,
            entry.supplier_name,
            entry.purchase_price_per_unit,
            entry.invoice_number,
            entry.created_at,
        ],
    )?;
    entry.id = conn.last_insert_rowid();

    conn.execute(
        "UPDATE medicines SET stock_quantity = stock_quantity + ?2, updated_at = datetime('now') WHERE id = ?1",
        params![entry.medicine_id, delta],
    )?;

    debug!(
        medicine_id = entry.medicine_id,
        entry_type = entry.entry_type.as_str(),
        delta,
        "stock movement"
    );
    Ok(entry.id)
}

/// Strip FTS5 syntax and turn each word into a quoted prefix match, so
/// keywords like `OR` are searched for rather than parsed.
fn escape_fts_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .map(|word| format!("\"{}\"*", word))
        .collect::<Vec<_>>()
        .join(" ")
}

struct PharmacyRow {
    id: i64,
    user_id: Option<i64>,
    display_id: String,
    name: String,
    license_number: Option<String>,
    drug_license_number: String,
    gstin: Option<String>,
    owner_name: String,
    address: String,
    city: Option<String>,
    state: Option<String>,
    pincode: Option<String>,
    location_lat: Option<f64>,
    location_lng: Option<f64>,
    phone: Option<String>,
    email: Option<String>,
    operating_hours: String,
    is_verified: bool,
    is_active: bool,
    rating: f64,
    home_delivery_available: bool,
    minimum_order_amount: i64,
    total_orders: i64,
    created_at: String,
    updated_at: String,
}

fn read_pharmacy_row(row: &Row<'_>) -> rusqlite::Result<PharmacyRow> {
    Ok(PharmacyRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        display_id: row.get(2)?,
        name: row.get(3)?,
        license_number: row.get(4)?,
        drug_license_number: row.get(5)?,
        gstin: row.get(6)?,
        owner_name: row.get(7)?,
        address: row.get(8)?,
        city: row.get(9)?,
        state: row.get(10)?,
        pincode: row.get(11)?,
        location_lat: row.get(12)?,
        location_lng: row.get(13)?,
        phone: row.get(14)?,
        email: row.get(15)?,
        operating_hours: row.get(16)?,
        is_verified: row.get(17)?,
        is_active: row.get(18)?,
        rating: row.get(19)?,
        home_delivery_available: row.get(20)?,
        minimum_order_amount: row.get(21)?,
        total_orders: row.get(22)?,
        created_at: row.get(23)?,
        updated_at: row.get(24)?,
    })
}

impl TryFrom<PharmacyRow> for Pharmacy {
    type Error = DbError;

    fn try_from(row: PharmacyRow) -> Result<Self, Self::Error> {
        Ok(Pharmacy {
            id: row.id,
            user_id: row.user_id,
            display_id: row.display_id,
            name: row.name,
            license_number: row.license_number,
            drug_license_number: row.drug_license_number,
            gstin: row.gstin,
            owner_name: row.owner_name,
            address: row.address,
            city: row.city,
            state: row.state,
            pincode: row.pincode,
            location_lat: row.location_lat,
            location_lng: row.location_lng,
            phone: row.phone,
            email: row.email,
            operating_hours: serde_json::from_str(&row.operating_hours)?,
            is_verified: row.is_verified,
            is_active: row.is_active,
            rating: row.rating,
            home_delivery_available: row.home_delivery_available,
            minimum_order_amount: row.minimum_order_amount,
            total_orders: row.total_orders,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn read_medicine(row: &Row<'_>) -> rusqlite::Result<Medicine> {
    Ok(Medicine {
        id: row.get(0)?,
        pharmacy_id: row.get(1)?,
        name: row.get(2)?,
        generic_name: row.get(3)?,
        manufacturer: row.get(4)?,
        composition: row.get(5)?,
        dosage: row.get(6)?,
        category: row.get(7)?,
        description: row.get(8)?,
        mrp: row.get(9)?,
        selling_price: row.get(10)?,
        discount_percentage: row.get(11)?,
        stock_quantity: row.get(12)?,
        reorder_level: row.get(13)?,
        requires_prescription: row.get(14)?,
        is_controlled_substance: row.get(15)?,
        schedule_type: row.get(16)?,
        expiry_date: row.get(17)?,
        batch_number: row.get(18)?,
        is_available: row.get(19)?,
        created_at: row.get(20)?,
        updated_at: row.get(21)?,
    })
}

struct StockEntryRow {
    id: i64,
    medicine_id: i64,
    pharmacy_id: i64,
    entry_type: String,
    quantity: i64,
    reference_id: Option<String>,
    batch_number: Option<String>,
    expiry_date: Option<String>,
    supplier_name: Option<String>,
    purchase_price_per_unit: Option<f64>,
    invoice_number: Option<String>,
    created_at: String,
}

impl TryFrom<StockEntryRow> for StockEntry {
    type Error = DbError;

    fn try_from(row: StockEntryRow) -> Result<Self, Self::Error> {
        let entry_type = StockEntryType::parse(&row.entry_type).ok_or_else(|| {
            DbError::InvalidState(format!("unknown stock entry type '{}'", row.entry_type))
        })?;

        Ok(StockEntry {
            id: row.id,
            medicine_id: row.medicine_id,
            pharmacy_id: row.pharmacy_id,
            entry_type,
            quantity: row.quantity,
            reference_id: row.reference_id,
            batch_number: row.batch_number,
            expiry_date: row.expiry_date,
            supplier_name: row.supplier_name,
            purchase_price_per_unit: row.purchase_price_per_unit,
            invoice_number: row.invoice_number,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ConstraintKind;

    fn setup_db() -> (Database, Pharmacy) {
        let db = Database::open_in_memory().unwrap();
        let mut pharmacy = Pharmacy::new("PHR001", "MedPlus Pharmacy", "DL-MH-2024-001", "Suresh Patil", "Dadar, Mumbai");
        pharmacy.license_number = Some("LIC-001".into());
        pharmacy.gstin = Some("27AABCU9603R1ZM".into());
        db.insert_pharmacy(&mut pharmacy).unwrap();
        (db, pharmacy)
    }

    fn medicine(pharmacy_id: i64, name: &str, generic: &str, stock: i64) -> Medicine {
        let mut m = Medicine::new(pharmacy_id, name, 25, 20, "2027-12-31", "BATCH-1");
        m.generic_name = Some(generic.into());
        m.stock_quantity = stock;
        m
    }

    #[test]
    fn test_escape_fts_query() {
        assert_eq!(escape_fts_query("para"), "\"para\"*");
        assert_eq!(escape_fts_query("amox 250"), "\"amox\"* \"250\"*");
        assert_eq!(escape_fts_query("\"a\" OR b-c"), "\"a\"* \"OR\"* \"b\"* \"c\"*");
        assert_eq!(escape_fts_query("  "), "");
    }

    #[test]
    fn test_pharmacy_unique_fields() {
        let (db, _) = setup_db();

        let mut same_license = Pharmacy::new("PHR002", "Other", "DL-2", "Owner", "Addr");
        same_license.license_number = Some("LIC-001".into());
        let err = db.insert_pharmacy(&mut same_license).unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));

        let mut same_gstin = Pharmacy::new("PHR003", "Other", "DL-3", "Owner", "Addr");
        same_gstin.gstin = Some("27AABCU9603R1ZM".into());
        let err = db.insert_pharmacy(&mut same_gstin).unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));
    }

    #[test]
    fn test_verify_pharmacy() {
        let (db, pharmacy) = setup_db();
        assert!(!db.get_pharmacy(pharmacy.id).unwrap().unwrap().is_verified);
        assert!(db.verify_pharmacy(pharmacy.id).unwrap());
        assert!(db.get_pharmacy_by_display_id("PHR001").unwrap().unwrap().is_verified);
    }

    #[test]
    fn test_opening_stock_is_ledgered() {
        let (db, pharmacy) = setup_db();
        let mut m = medicine(pharmacy.id, "Paracetamol 500mg", "Paracetamol", 500);
        db.insert_medicine(&mut m).unwrap();

        assert_eq!(db.get_medicine(m.id).unwrap().unwrap().stock_quantity, 500);
        let entries = db.list_stock_entries(m.id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type, StockEntryType::Purchase);
        assert_eq!(entries[0].quantity, 500);
    }

    #[test]
    fn test_search_medicines() {
        let (db, pharmacy) = setup_db();
        db.insert_medicine(&mut medicine(pharmacy.id, "Crocin 500", "Paracetamol", 10))
            .unwrap();
        db.insert_medicine(&mut medicine(pharmacy.id, "Mox 250", "Amoxicillin", 10))
            .unwrap();
        let mut hidden = medicine(pharmacy.id, "Dolo 650", "Paracetamol", 10);
        hidden.is_available = false;
        db.insert_medicine(&mut hidden).unwrap();

        let results = db.search_medicines("parac", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Crocin 500");

        assert_eq!(db.search_medicines("amox", 10).unwrap().len(), 1);
        assert!(db.search_medicines("***", 10).unwrap().is_empty());
    }

    #[test]
    fn test_search_treats_keywords_as_words() {
        let (db, pharmacy) = setup_db();
        db.insert_medicine(&mut medicine(pharmacy.id, "Crocin Or Not", "Paracetamol", 10))
            .unwrap();
        db.insert_medicine(&mut medicine(pharmacy.id, "Mox 250", "Amoxicillin", 10))
            .unwrap();

        for keyword in ["OR", "NOT", "AND", "near"] {
            assert!(db.search_medicines(keyword, 10).is_ok(), "searching {}", keyword);
        }

        let hits = db.search_medicines("crocin OR", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Crocin Or Not");
        assert_eq!(db.search_medicines("not", 10).unwrap().len(), 1);
        assert!(db.search_medicines("AND", 10).unwrap().is_empty());
    }

    #[test]
    fn test_search_follows_rename() {
        let (db, pharmacy) = setup_db();
        let mut m = medicine(pharmacy.id, "Crocin 500", "Paracetamol", 10);
        db.insert_medicine(&mut m).unwrap();

        m.name = "Calpol 500".into();
        db.update_medicine(&m).unwrap();

        assert!(db.search_medicines("crocin", 10).unwrap().is_empty());
        assert_eq!(db.search_medicines("calpol", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_stock_movements() {
        let (db, pharmacy) = setup_db();
        let mut m = medicine(pharmacy.id, "Cetirizine 10mg", "Cetirizine", 20);
        db.insert_medicine(&mut m).unwrap();

        let mut sale = StockEntry::new(m.id, pharmacy.id, StockEntryType::Sale, 15);
        db.record_stock_entry(&mut sale).unwrap();
        assert_eq!(db.get_medicine(m.id).unwrap().unwrap().stock_quantity, 5);

        let mut too_much = StockEntry::new(m.id, pharmacy.id, StockEntryType::Adjustment, 6);
        let err = db.record_stock_entry(&mut too_much).unwrap_err();
        assert!(matches!(
            err,
            DbError::InsufficientStock { available: 5, requested: 6, .. }
        ));
        assert_eq!(db.get_medicine(m.id).unwrap().unwrap().stock_quantity, 5);

        let mut purchase = StockEntry::new(m.id, pharmacy.id, StockEntryType::Purchase, 100);
        purchase.supplier_name = Some("Cipla Distributors".into());
        db.record_stock_entry(&mut purchase).unwrap();
        assert_eq!(db.get_medicine(m.id).unwrap().unwrap().stock_quantity, 105);
        assert_eq!(db.list_stock_entries(m.id).unwrap().len(), 3);
    }

    #[test]
    fn test_zero_quantity_entry_rejected() {
        let (db, pharmacy) = setup_db();
        let mut m = medicine(pharmacy.id, "Cetirizine 10mg", "Cetirizine", 20);
        db.insert_medicine(&mut m).unwrap();

        let mut zero = StockEntry::new(m.id, pharmacy.id, StockEntryType::Purchase, 0);
        let err = db.record_stock_entry(&mut zero).unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Check));
        assert_eq!(db.get_medicine(m.id).unwrap().unwrap().stock_quantity, 20);
    }

    #[test]
    fn test_ledger_is_append_only() {
        let (db, pharmacy) = setup_db();
        let mut m = medicine(pharmacy.id, "Cetirizine 10mg", "Cetirizine", 20);
        db.insert_medicine(&mut m).unwrap();

        let err: DbError = db
            .conn()
            .execute("UPDATE stock_entries SET quantity = 1", [])
            .unwrap_err()
            .into();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Trigger));

        // Entries go with their medicine
        assert!(db.delete_medicine(m.id).unwrap());
        assert!(db.list_stock_entries(m.id).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_pharmacy_movement() {
        let (db, pharmacy) = setup_db();
        let mut other = Pharmacy::new("PHR009", "Other", "DL-9", "Owner", "Addr");
        db.insert_pharmacy(&mut other).unwrap();

        let mut m = medicine(pharmacy.id, "Cetirizine 10mg", "Cetirizine", 20);
        db.insert_medicine(&mut m).unwrap();

        let mut entry = StockEntry::new(m.id, other.id, StockEntryType::Sale, 1);
        assert!(matches!(
            db.record_stock_entry(&mut entry),
            Err(DbError::InvalidState(_))
        ));
    }

    #[test]
    fn test_low_stock_listing() {
        let (db, pharmacy) = setup_db();
        db.insert_medicine(&mut medicine(pharmacy.id, "A", "A", 5)).unwrap();
        db.insert_medicine(&mut medicine(pharmacy.id, "B", "B", 10)).unwrap();
        db.insert_medicine(&mut medicine(pharmacy.id, "C", "C", 50)).unwrap();

        let low: Vec<String> = db
            .list_low_stock_medicines(pharmacy.id)
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(low, vec!["A", "B"]);
        assert_eq!(db.list_medicines_for_pharmacy(pharmacy.id).unwrap().len(), 3);
    }

    #[test]
    fn test_expiring_window() {
        let (db, pharmacy) = setup_db();
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

        for (name, expiry) in [
            ("Expired", "2025-02-28"),
            ("Today", "2025-03-01"),
            ("Threshold", "2025-05-30"),
            ("Past threshold", "2025-05-31"),
            ("Soon", "2025-03-15"),
        ] {
            let mut m = Medicine::new(pharmacy.id, name, 25, 20, expiry, "B1");
            m.stock_quantity = 10;
            db.insert_medicine(&mut m).unwrap();
        }

        let names: Vec<String> = db
            .list_expiring_medicines(pharmacy.id, today, 90)
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["Today", "Soon", "Threshold"]);

        assert_eq!(db.list_expiring_medicines(pharmacy.id, today, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_pharmacy_delete_cascades_medicines() {
        let (db, pharmacy) = setup_db();
        let mut m = medicine(pharmacy.id, "A", "A", 5);
        db.insert_medicine(&mut m).unwrap();

        db.conn()
            .execute("DELETE FROM pharmacies WHERE id = ?", [pharmacy.id])
            .unwrap();
        assert!(db.get_medicine(m.id).unwrap().is_none());
    }
}
