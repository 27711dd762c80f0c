//! Order placement and fulfilment operations.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use super::activity::{insert_audit, insert_notification};
use super::pharmacy::apply_stock_entry;
use super::{Database, DbError, DbResult};
use crate::models::{
    generate_reference_id, now_timestamp, AuditEntry, DeliveryType, NewOrder, Notification,
    Order, OrderItem, OrderStatus, PaymentStatus, StockEntry, StockEntryType,
};

const ORDER_COLUMNS: &str = r#"
    id, user_id, pharmacy_id, prescription_id, total_amount, delivery_address,
    contact_number, delivery_type, order_status, payment_status, tracking_number,
    estimated_delivery, delivered_at, notes, created_at, updated_at
"#;

impl Database {
    /// Place an order in one transaction.
    ///
    /// Every line must name an available medicine of the chosen pharmacy with
    /// enough stock. Items are priced at the medicine's current selling price,
    /// stock leaves through `sale` ledger entries, the pharmacy's order
    /// counter is bumped and an audit entry is written.
    pub fn place_order(&self, order: &NewOrder) -> DbResult<Order> {
        if order.lines.is_empty() {
            return Err(DbError::InvalidState("order has no items".into()));
        }

        let tx = self.begin()?;

        let pharmacy_active: bool = tx
            .query_row(
                "SELECT is_active FROM pharmacies WHERE id = ?",
                [order.pharmacy_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("pharmacy {}", order.pharmacy_id)))?;
        if !pharmacy_active {
            return Err(DbError::InvalidState(format!(
                "pharmacy {} is not accepting orders",
                order.pharmacy_id
            )));
        }

        let mut priced = Vec::with_capacity(order.lines.len());
        let mut items_total = 0i64;
        for line in &order.lines {
            let (pharmacy_id, price, stock, available): (i64, i64, i64, bool) = tx
                .query_row(
                    "SELECT pharmacy_id, selling_price, stock_quantity, is_available FROM medicines WHERE id = ?",
                    [line.medicine_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?
                .ok_or_else(|| DbError::NotFound(format!("medicine {}", line.medicine_id)))?;

            if pharmacy_id != order.pharmacy_id {
                return Err(DbError::InvalidState(format!(
                    "medicine {} is not sold by pharmacy {}",
                    line.medicine_id, order.pharmacy_id
                )));
            }
            if !available {
                return Err(DbError::InvalidState(format!(
                    "medicine {} is not available",
                    line.medicine_id
                )));
            }
            if line.quantity > 0 && stock < line.quantity {
                return Err(DbError::InsufficientStock {
                    medicine_id: line.medicine_id,
                    available: stock,
                    requested: line.quantity,
                });
            }

            items_total += price * line.quantity;
            priced.push((line, price));
        }

        let id = generate_reference_id("ORD");
        let total_amount = items_total + order.delivery_type.delivery_charge();
        let now = now_timestamp();

        tx.execute(
            r#"
            INSERT INTO orders (
                id, user_id, pharmacy_id, prescription_id, total_amount, delivery_address,
                contact_number, delivery_type, order_status, payment_status, notes,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            "#,
            params![
                id,
                order.user_id,
                order.pharmacy_id,
                order.prescription_id,
                total_amount,
                order.delivery_address,
                order.contact_number,
                order.delivery_type.as_str(),
                OrderStatus::Pending.as_str(),
                PaymentStatus::Pending.as_str(),
                order.notes,
                now,
            ],
        )?;

        for (line, price) in &priced {
            tx.execute(
                "INSERT INTO order_items (order_id, medicine_id, quantity, price) VALUES (?1, ?2, ?3, ?4)",
                params![id, line.medicine_id, line.quantity, price],
            )?;

            let mut sale = StockEntry::new(
                line.medicine_id,
                order.pharmacy_id,
                StockEntryType::Sale,
                line.quantity,
            )
            .with_reference(id.clone());
            apply_stock_entry(&tx, &mut sale)?;
        }

        tx.execute(
            "UPDATE pharmacies SET total_orders = total_orders + 1, updated_at = datetime('now') WHERE id = ?",
            [order.pharmacy_id],
        )?;

        let audit = AuditEntry::new(Some(order.user_id), "order_placed")
            .on("order", id.clone())
            .with_details(serde_json::json!({
                "pharmacy_id": order.pharmacy_id,
                "items": order.lines.len(),
                "total_amount": total_amount,
                "delivery_type": order.delivery_type.as_str(),
            }));
        insert_audit(&tx, &audit)?;

        let eta = match order.delivery_type {
            DeliveryType::Express => "within 2 hours",
            DeliveryType::Home => "tomorrow by 6 PM",
            DeliveryType::Pickup => "ready for pickup",
        };
        let notification = Notification::new(
            order.user_id,
            "Order placed",
            format!("Your medicine order #{} is confirmed. Delivery: {}", id, eta),
            "order",
        )
        .about("order", id.clone());
        insert_notification(&tx, &notification)?;

        tx.commit()?;
        info!(order_id = %id, total_amount, "placed order");

        self.get_order(&id)?
            .ok_or_else(|| DbError::NotFound(format!("order {}", id)))
    }

    /// Get an order with its items.
    pub fn get_order(&self, id: &str) -> DbResult<Option<Order>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM orders WHERE id = ?", ORDER_COLUMNS),
                [id],
                read_order_row,
            )
            .optional()?;

        match row {
            Some(row) => {
                let mut order: Order = row.try_into()?;
                order.items = load_order_items(&self.conn, &order.id)?;
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    /// Orders for a user, newest first.
    pub fn list_orders_for_user(&self, user_id: i64, status: Option<OrderStatus>) -> DbResult<Vec<Order>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM orders
            WHERE user_id = ?1 AND (?2 IS NULL OR order_status = ?2)
            ORDER BY created_at DESC, id
            "#,
            ORDER_COLUMNS
        ))?;

        let rows = stmt.query_map(params![user_id, status.map(|s| s.as_str())], read_order_row)?;

        let mut orders = Vec::new();
        for row in rows {
            let mut order: Order = row?.try_into()?;
            order.items = load_order_items(&self.conn, &order.id)?;
            orders.push(order);
        }
        Ok(orders)
    }

    /// Advance an order along its fulfilment path. Cancelling restores stock.
    pub fn update_order_status(&self, id: &str, next: OrderStatus) -> DbResult<Order> {
        if next == OrderStatus::Cancelled {
            return self.cancel_order(id, None);
        }

        let tx = self.begin()?;
        let current = current_order_status(&tx, id)?;
        if !current.can_transition_to(next) {
            return Err(DbError::InvalidTransition {
                entity: "order",
                from: current.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }

        if next == OrderStatus::Delivered {
            tx.execute(
                "UPDATE orders SET order_status = ?2, delivered_at = datetime('now'), updated_at = datetime('now') WHERE id = ?1",
                params![id, next.as_str()],
            )?;
        } else {
            tx.execute(
                "UPDATE orders SET order_status = ?2, updated_at = datetime('now') WHERE id = ?1",
                params![id, next.as_str()],
            )?;
        }
        tx.commit()?;

        self.get_order(id)?
            .ok_or_else(|| DbError::NotFound(format!("order {}", id)))
    }

    /// Cancel an order before it ships and return its stock.
    pub fn cancel_order(&self, id: &str, reason: Option<&str>) -> DbResult<Order> {
        let tx = self.begin()?;
        let current = current_order_status(&tx, id)?;
        if !current.can_transition_to(OrderStatus::Cancelled) {
            return Err(DbError::InvalidTransition {
                entity: "order",
                from: current.as_str().to_string(),
                to: OrderStatus::Cancelled.as_str().to_string(),
            });
        }

        let (user_id, pharmacy_id): (i64, i64) = tx.query_row(
            "SELECT user_id, pharmacy_id FROM orders WHERE id = ?",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        tx.execute(
            r#"
            UPDATE orders SET
                order_status = 'cancelled',
                notes = COALESCE(?2, notes),
                updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![id, reason],
        )?;

        let items = load_order_items(&tx, id)?;
        for item in &items {
            let mut ret = StockEntry::new(item.medicine_id, pharmacy_id, StockEntryType::Return, item.quantity)
                .with_reference(id.to_string());
            apply_stock_entry(&tx, &mut ret)?;
        }

        let audit = AuditEntry::new(Some(user_id), "order_cancelled")
            .on("order", id.to_string())
            .with_details(serde_json::json!({
                "from_status": current.as_str(),
                "reason": reason,
                "items_restocked": items.len(),
            }));
        insert_audit(&tx, &audit)?;

        tx.commit()?;
        info!(order_id = id, "cancelled order");

        self.get_order(id)?
            .ok_or_else(|| DbError::NotFound(format!("order {}", id)))
    }

    /// Update payment status independently of fulfilment.
    pub fn update_payment_status(&self, id: &str, status: PaymentStatus) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE orders SET payment_status = ?2, updated_at = datetime('now') WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn set_order_tracking(
        &self,
        id: &str,
        tracking_number: &str,
        estimated_delivery: Option<&str>,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE orders SET
                tracking_number = ?2,
                estimated_delivery = ?3,
                updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![id, tracking_number, estimated_delivery],
        )?;
        Ok(rows_affected > 0)
    }
}

fn current_order_status(conn: &Connection, id: &str) -> DbResult<OrderStatus> {
    let status: String = conn
        .query_row("SELECT order_status FROM orders WHERE id = ?", [id], |row| {
            row.get(0)
        })
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("order {}", id)))?;
    OrderStatus::parse(&status)
        .ok_or_else(|| DbError::InvalidState(format!("unknown order status '{}'", status)))
}

fn load_order_items(conn: &Connection, order_id: &str) -> DbResult<Vec<OrderItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, order_id, medicine_id, quantity, price FROM order_items WHERE order_id = ? ORDER BY id",
    )?;
    let rows = stmt.query_map([order_id], |row| {
        Ok(OrderItem {
            id: row.get(0)?,
            order_id: row.get(1)?,
            medicine_id: row.get(2)?,
            quantity: row.get(3)?,
            price: row.get(4)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Intermediate row struct for database mapping.
struct OrderRow {
    id: String,
    user_id: i64,
    pharmacy_id: i64,
    prescription_id: Option<i64>,
    total_amount: i64,
    delivery_address: String,
    contact_number: String,
    delivery_type: String,
    order_status: String,
    payment_status: String,
    tracking_number: Option<String>,
    estimated_delivery: Option<String>,
    delivered_at: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_order_row(row: &Row<'_>) -> rusqlite::Result<OrderRow> {
    Ok(OrderRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        pharmacy_id: row.get(2)?,
        prescription_id: row.get(3)?,
        total_amount: row.get(4)?,
        delivery_address: row.get(5)?,
        contact_number: row.get(6)?,
        delivery_type: row.get(7)?,
        order_status: row.get(8)?,
        payment_status: row.get(9)?,
        tracking_number: row.get(10)?,
        estimated_delivery: row.get(11)?,
        delivered_at: row.get(12)?,
        notes: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

impl TryFrom<OrderRow> for Order {
    type Error = DbError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let delivery_type = DeliveryType::parse(&row.delivery_type).ok_or_else(|| {
            DbError::InvalidState(format!("unknown delivery type '{}'", row.delivery_type))
        })?;
        let order_status = OrderStatus::parse(&row.order_status).ok_or_else(|| {
            DbError::InvalidState(format!("unknown order status '{}'", row.order_status))
        })?;
        let payment_status = PaymentStatus::parse(&row.payment_status).ok_or_else(|| {
            DbError::InvalidState(format!("unknown payment status '{}'", row.payment_status))
        })?;

        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            pharmacy_id: row.pharmacy_id,
            prescription_id: row.prescription_id,
            total_amount: row.total_amount,
            delivery_address: row.delivery_address,
            contact_number: row.contact_number,
            delivery_type,
            order_status,
            payment_status,
            tracking_number: row.tracking_number,
            estimated_delivery: row.estimated_delivery,
            delivered_at: row.delivered_at,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
            items: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ConstraintKind;
    use crate::models::{Medicine, OrderLine, Pharmacy, User};

    struct Fixture {
        db: Database,
        user_id: i64,
        pharmacy_id: i64,
        paracetamol: i64,
        amoxicillin: i64,
    }

    fn setup() -> Fixture {
        let db = Database::open_in_memory().unwrap();

        let mut user = User::new("+919876543210");
        db.insert_user(&mut user).unwrap();

        let mut pharmacy = Pharmacy::new("PHR001", "MedPlus", "DL-1", "Owner", "Dadar");
        db.insert_pharmacy(&mut pharmacy).unwrap();

        let mut paracetamol = Medicine::new(pharmacy.id, "Paracetamol 500mg", 25, 20, "2027-12-31", "B1");
        paracetamol.stock_quantity = 10;
        db.insert_medicine(&mut paracetamol).unwrap();

        let mut amoxicillin = Medicine::new(pharmacy.id, "Amoxicillin 250mg", 150, 120, "2027-12-31", "B2");
        amoxicillin.stock_quantity = 5;
        db.insert_medicine(&mut amoxicillin).unwrap();

        Fixture {
            db,
            user_id: user.id,
            pharmacy_id: pharmacy.id,
            paracetamol: paracetamol.id,
            amoxicillin: amoxicillin.id,
        }
    }

    fn stock(f: &Fixture, id: i64) -> i64 {
        f.db.get_medicine(id).unwrap().unwrap().stock_quantity
    }

    fn new_order(f: &Fixture, lines: Vec<OrderLine>) -> NewOrder {
        NewOrder::new(f.user_id, f.pharmacy_id, lines, "12 MG Road, Mumbai", "+919876543210")
    }

    #[test]
    fn test_place_order() {
        let f = setup();
        let mut request = new_order(
            &f,
            vec![
                OrderLine { medicine_id: f.paracetamol, quantity: 3 },
                OrderLine { medicine_id: f.amoxicillin, quantity: 1 },
            ],
        );
        request.delivery_type = DeliveryType::Express;

        let order = f.db.place_order(&request).unwrap();
        assert!(order.id.starts_with("ORD"));
        assert_eq!(order.items.len(), 2);
        assert_eq!(order.items_total(), 3 * 20 + 120);
        assert_eq!(order.total_amount, 3 * 20 + 120 + 50);
        assert_eq!(order.order_status, OrderStatus::Pending);

        assert_eq!(stock(&f, f.paracetamol), 7);
        assert_eq!(stock(&f, f.amoxicillin), 4);
        assert_eq!(f.db.get_pharmacy(f.pharmacy_id).unwrap().unwrap().total_orders, 1);
        assert_eq!(f.db.list_audit_for_entity("order", &order.id).unwrap().len(), 1);
        assert_eq!(f.db.unread_notification_count(f.user_id).unwrap(), 1);
    }

    #[test]
    fn test_insufficient_stock_leaves_nothing_behind() {
        let f = setup();
        let request = new_order(
            &f,
            vec![
                OrderLine { medicine_id: f.paracetamol, quantity: 2 },
                OrderLine { medicine_id: f.amoxicillin, quantity: 6 },
            ],
        );

        let err = f.db.place_order(&request).unwrap_err();
        assert!(matches!(err, DbError::InsufficientStock { requested: 6, available: 5, .. }));
        assert_eq!(stock(&f, f.paracetamol), 10);
        assert_eq!(stock(&f, f.amoxicillin), 5);
        assert!(f.db.list_orders_for_user(f.user_id, None).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_lines_checked_cumulatively() {
        let f = setup();
        let request = new_order(
            &f,
            vec![
                OrderLine { medicine_id: f.amoxicillin, quantity: 3 },
                OrderLine { medicine_id: f.amoxicillin, quantity: 3 },
            ],
        );
        assert!(matches!(
            f.db.place_order(&request),
            Err(DbError::InsufficientStock { .. })
        ));
        assert_eq!(stock(&f, f.amoxicillin), 5);
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        let f = setup();
        let request = new_order(&f, vec![OrderLine { medicine_id: f.paracetamol, quantity: 0 }]);
        let err = f.db.place_order(&request).unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Check));
        assert_eq!(stock(&f, f.paracetamol), 10);
    }

    #[test]
    fn test_foreign_medicine_rejected() {
        let f = setup();
        let mut other = Pharmacy::new("PHR002", "Other", "DL-2", "Owner", "Bandra");
        f.db.insert_pharmacy(&mut other).unwrap();
        let mut foreign = Medicine::new(other.id, "Omeprazole 20mg", 100, 80, "2027-12-31", "B9");
        foreign.stock_quantity = 10;
        f.db.insert_medicine(&mut foreign).unwrap();

        let request = new_order(&f, vec![OrderLine { medicine_id: foreign.id, quantity: 1 }]);
        assert!(matches!(f.db.place_order(&request), Err(DbError::InvalidState(_))));
        assert!(matches!(
            f.db.place_order(&new_order(&f, vec![])),
            Err(DbError::InvalidState(_))
        ));
    }

    #[test]
    fn test_fulfilment_path() {
        let f = setup();
        let order = f
            .db
            .place_order(&new_order(&f, vec![OrderLine { medicine_id: f.paracetamol, quantity: 1 }]))
            .unwrap();

        for next in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
        ] {
            f.db.update_order_status(&order.id, next).unwrap();
        }
        let err = f.db.cancel_order(&order.id, None).unwrap_err();
        assert!(matches!(err, DbError::InvalidTransition { entity: "order", .. }));

        let delivered = f.db.update_order_status(&order.id, OrderStatus::Delivered).unwrap();
        assert!(delivered.delivered_at.is_some());
        assert_eq!(stock(&f, f.paracetamol), 9);
    }

    #[test]
    fn test_skipping_steps_rejected() {
        let f = setup();
        let order = f
            .db
            .place_order(&new_order(&f, vec![OrderLine { medicine_id: f.paracetamol, quantity: 1 }]))
            .unwrap();
        assert!(matches!(
            f.db.update_order_status(&order.id, OrderStatus::Shipped),
            Err(DbError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_cancel_restores_stock() {
        let f = setup();
        let order = f
            .db
            .place_order(&new_order(&f, vec![OrderLine { medicine_id: f.paracetamol, quantity: 4 }]))
            .unwrap();
        f.db.update_order_status(&order.id, OrderStatus::Confirmed).unwrap();
        assert_eq!(stock(&f, f.paracetamol), 6);

        let cancelled = f.db.cancel_order(&order.id, Some("ordered twice")).unwrap();
        assert_eq!(cancelled.order_status, OrderStatus::Cancelled);
        assert_eq!(cancelled.notes.as_deref(), Some("ordered twice"));
        assert_eq!(stock(&f, f.paracetamol), 10);

        let ledger = f.db.list_stock_entries(f.paracetamol).unwrap();
        let last = ledger.last().unwrap();
        assert_eq!(last.entry_type, StockEntryType::Return);
        assert_eq!(last.reference_id.as_deref(), Some(order.id.as_str()));

        // Cancelling twice is not a transition
        assert!(f.db.cancel_order(&order.id, None).is_err());
    }

    #[test]
    fn test_payment_and_tracking() {
        let f = setup();
        let order = f
            .db
            .place_order(&new_order(&f, vec![OrderLine { medicine_id: f.paracetamol, quantity: 1 }]))
            .unwrap();

        assert!(f.db.update_payment_status(&order.id, PaymentStatus::Success).unwrap());
        assert!(f.db.set_order_tracking(&order.id, "TRK123", Some("2025-03-02")).unwrap());

        let fetched = f.db.get_order(&order.id).unwrap().unwrap();
        assert_eq!(fetched.payment_status, PaymentStatus::Success);
        assert_eq!(fetched.order_status, OrderStatus::Pending);
        assert_eq!(fetched.tracking_number.as_deref(), Some("TRK123"));

        let pending = f
            .db
            .list_orders_for_user(f.user_id, Some(OrderStatus::Pending))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].items.len(), 1);
    }

    #[test]
    fn test_ordered_medicine_cannot_be_deleted() {
        let f = setup();
        f.db.place_order(&new_order(&f, vec![OrderLine { medicine_id: f.paracetamol, quantity: 1 }]))
            .unwrap();

        let err = f.db.delete_medicine(f.paracetamol).unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::ForeignKey));
        assert!(f.db.delete_medicine(f.amoxicillin).unwrap());
    }
}
