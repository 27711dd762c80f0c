//! Pharmacy, medicine and stock ledger models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A registered pharmacy store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pharmacy {
    pub id: i64,
    /// Owner account
    pub user_id: Option<i64>,
    /// Public store code, unique
    pub display_id: String,
    pub name: String,
    pub license_number: Option<String>,
    pub drug_license_number: String,
    pub gstin: Option<String>,
    pub owner_name: String,
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub operating_hours: BTreeMap<String, String>,
    pub is_verified: bool,
    pub is_active: bool,
    pub rating: f64,
    pub home_delivery_available: bool,
    pub minimum_order_amount: i64,
    pub total_orders: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Pharmacy {
    pub fn new(
        display_id: impl Into<String>,
        name: impl Into<String>,
        drug_license_number: impl Into<String>,
        owner_name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        let now = super::now_timestamp();
        Self {
            id: 0,
            user_id: None,
            display_id: display_id.into(),
            name: name.into(),
            license_number: None,
            drug_license_number: drug_license_number.into(),
            gstin: None,
            owner_name: owner_name.into(),
            address: address.into(),
            city: None,
            state: None,
            pincode: None,
            location_lat: None,
            location_lng: None,
            phone: None,
            email: None,
            operating_hours: BTreeMap::new(),
            is_verified: false,
            is_active: true,
            rating: 0.0,
            home_delivery_available: true,
            minimum_order_amount: 0,
            total_orders: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// A stocked medicine batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Medicine {
    pub id: i64,
    pub pharmacy_id: i64,
    pub name: String,
    pub generic_name: Option<String>,
    pub manufacturer: Option<String>,
    pub composition: Option<String>,
    pub dosage: Option<String>,
    /// tablet, syrup, injection, ...
    pub category: Option<String>,
    pub description: Option<String>,
    pub mrp: i64,
    pub selling_price: i64,
    pub discount_percentage: f64,
    /// Maintained through the stock ledger
    pub stock_quantity: i64,
    pub reorder_level: i64,
    pub requires_prescription: bool,
    pub is_controlled_substance: bool,
    pub schedule_type: Option<String>,
    pub expiry_date: String,
    pub batch_number: String,
    pub is_available: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Medicine {
    pub fn new(
        pharmacy_id: i64,
        name: impl Into<String>,
        mrp: i64,
        selling_price: i64,
        expiry_date: impl Into<String>,
        batch_number: impl Into<String>,
    ) -> Self {
        let now = super::now_timestamp();
        Self {
            id: 0,
            pharmacy_id,
            name: name.into(),
            generic_name: None,
            manufacturer: None,
            composition: None,
            dosage: None,
            category: None,
            description: None,
            mrp,
            selling_price,
            discount_percentage: 0.0,
            stock_quantity: 0,
            reorder_level: 10,
            requires_prescription: false,
            is_controlled_substance: false,
            schedule_type: None,
            expiry_date: expiry_date.into(),
            batch_number: batch_number.into(),
            is_available: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.reorder_level
    }

    /// Discount off MRP, rounded to two decimals.
    pub fn computed_discount(&self) -> f64 {
        if self.mrp <= 0 || self.selling_price >= self.mrp {
            return 0.0;
        }
        let pct = (self.mrp - self.selling_price) as f64 * 100.0 / self.mrp as f64;
        (pct * 100.0).round() / 100.0
    }
}

/// Kind of stock movement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StockEntryType {
    Purchase,
    Sale,
    Return,
    Adjustment,
}

impl StockEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockEntryType::Purchase => "purchase",
            StockEntryType::Sale => "sale",
            StockEntryType::Return => "return",
            StockEntryType::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(StockEntryType::Purchase),
            "sale" => Some(StockEntryType::Sale),
            "return" => Some(StockEntryType::Return),
            "adjustment" => Some(StockEntryType::Adjustment),
            _ => None,
        }
    }

    /// Signed change applied to `stock_quantity` for `quantity` units.
    pub fn stock_delta(&self, quantity: i64) -> i64 {
        match self {
            StockEntryType::Purchase | StockEntryType::Return => quantity,
            StockEntryType::Sale | StockEntryType::Adjustment => -quantity,
        }
    }
}

/// One row of the append-only stock ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockEntry {
    pub id: i64,
    pub medicine_id: i64,
    pub pharmacy_id: i64,
    pub entry_type: StockEntryType,
    /// Always positive; direction comes from `entry_type`
    pub quantity: i64,
    /// Order id, invoice or other source document
    pub reference_id: Option<String>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<String>,
    pub supplier_name: Option<String>,
    pub purchase_price_per_unit: Option<f64>,
    pub invoice_number: Option<String>,
    pub created_at: String,
}

impl StockEntry {
    pub fn new(medicine_id: i64, pharmacy_id: i64, entry_type: StockEntryType, quantity: i64) -> Self {
        Self {
            id: 0,
            medicine_id,
            pharmacy_id,
            entry_type,
            quantity,
            reference_id: None,
            batch_number: None,
            expiry_date: None,
            supplier_name: None,
            purchase_price_per_unit: None,
            invoice_number: None,
            created_at: super::now_timestamp(),
        }
    }

    pub fn with_reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }
}
