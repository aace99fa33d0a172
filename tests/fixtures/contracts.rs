use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stocked item
#[derive(Debug, Serialize, Deserialize)]
pub struct Item {
    #[serde(skip_deserializing)]
    pub id: Uuid,
    pub name: String,
    pub status: ItemStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Unit price in the store currency
    pub price: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    InStock,
    Backordered,
    Discontinued,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Open,
    Closed,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Order {
    #[serde(skip_deserializing)]
    pub id: u64,
    pub state: OrderState,
    pub items: Vec<Item>,
    pub note: Option<String>,
}

/// Categories nest without a depth limit
#[derive(Debug, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub children: Vec<Category>,
    pub parent: Option<Box<Category>>,
}

pub mod tickets {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum TicketStatus {
        Open,
        Closed,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Ticket {
        #[serde(skip_deserializing)]
        pub id: u64,
        pub title: String,
        /// Current workflow state
        pub status: TicketStatus,
    }
}
