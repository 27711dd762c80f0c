//! Medicine order models.

use serde::{Deserialize, Serialize};

/// Fulfilment status of an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "processing" => Some(OrderStatus::Processing),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Orders can be cancelled until they leave the pharmacy.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Processing
        )
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match next {
            Cancelled => self.is_cancellable(),
            _ => matches!(
                (self, next),
                (Pending, Confirmed) | (Confirmed, Processing) | (Processing, Shipped) | (Shipped, Delivered)
            ),
        }
    }
}

/// Payment state, tracked independently of fulfilment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::PartiallyRefunded => "partially_refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "success" => Some(PaymentStatus::Success),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            "partially_refunded" => Some(PaymentStatus::PartiallyRefunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryType {
    Home,
    Express,
    Pickup,
}

impl DeliveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryType::Home => "home",
            DeliveryType::Express => "express",
            DeliveryType::Pickup => "pickup",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "home" => Some(DeliveryType::Home),
            "express" => Some(DeliveryType::Express),
            "pickup" => Some(DeliveryType::Pickup),
            _ => None,
        }
    }

    /// Flat delivery charge in rupees.
    pub fn delivery_charge(&self) -> i64 {
        match self {
            DeliveryType::Express => 50,
            DeliveryType::Home | DeliveryType::Pickup => 0,
        }
    }
}

/// A placed order with its line items.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// ORD reference id
    pub id: String,
    pub user_id: i64,
    pub pharmacy_id: i64,
    pub prescription_id: Option<i64>,
    /// Sum of line totals plus delivery charge
    pub total_amount: i64,
    pub delivery_address: String,
    pub contact_number: String,
    pub delivery_type: DeliveryType,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<String>,
    pub delivered_at: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn items_total(&self) -> i64 {
        self.items.iter().map(OrderItem::line_total).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: String,
    pub medicine_id: i64,
    pub quantity: i64,
    /// Unit price at time of order
    pub price: i64,
}

impl OrderItem {
    pub fn line_total(&self) -> i64 {
        self.price * self.quantity
    }
}

/// Requested quantity of one medicine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderLine {
    pub medicine_id: i64,
    pub quantity: i64,
}

/// Input for placing an order.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: i64,
    pub pharmacy_id: i64,
    pub prescription_id: Option<i64>,
    pub lines: Vec<OrderLine>,
    pub delivery_address: String,
    pub contact_number: String,
    pub delivery_type: DeliveryType,
    pub notes: Option<String>,
}

impl NewOrder {
    pub fn new(
        user_id: i64,
        pharmacy_id: i64,
        lines: Vec<OrderLine>,
        delivery_address: impl Into<String>,
        contact_number: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            pharmacy_id,
            prescription_id: None,
            lines,
            delivery_address: delivery_address.into(),
            contact_number: contact_number.into(),
            delivery_type: DeliveryType::Home,
            notes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));

        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Delivered.can_transition_to(Pending));
    }

    #[test]
    fn test_cancel_before_shipping_only() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn test_delivery_charge() {
        assert_eq!(DeliveryType::Express.delivery_charge(), 50);
        assert_eq!(DeliveryType::Home.delivery_charge(), 0);
        assert_eq!(DeliveryType::Pickup.delivery_charge(), 0);
    }

    #[test]
    fn test_payment_status_strings() {
        assert_eq!(PaymentStatus::PartiallyRefunded.as_str(), "partially_refunded");
        assert_eq!(PaymentStatus::parse("success"), Some(PaymentStatus::Success));
    }
}
