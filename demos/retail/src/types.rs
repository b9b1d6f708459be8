//! Row types for the retail demo.
//!
//! Column names follow the source CSV headers.

use serde::{Deserialize, Serialize};

/// A point-of-sale transaction (the stream side).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Transaction {
    #[serde(rename = "orderID")]
    pub order_id: String,
    #[serde(rename = "Customer_ID")]
    pub customer_id: String,
    #[serde(rename = "Product_ID")]
    pub product_id: String,
    pub quantity: u32,
    pub date: String,
}

/// Customer master data (the disk side).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Customer {
    #[serde(rename = "Customer_ID")]
    pub customer_id: String,
    #[serde(rename = "Gender")]
    pub gender: String,
    #[serde(rename = "Age")]
    pub age: String,
    #[serde(rename = "Occupation")]
    pub occupation: u32,
    #[serde(rename = "City_Category")]
    pub city_category: String,
    #[serde(rename = "Stay_In_Current_City_Years")]
    pub stay_in_current_city_years: String,
    #[serde(rename = "Marital_Status")]
    pub marital_status: u8,
}

/// Product master data, held in memory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Product {
    #[serde(rename = "Product_ID")]
    pub product_id: String,
    #[serde(rename = "Product_Category")]
    pub product_category: String,
    #[serde(rename = "price$")]
    pub price: f64,
    #[serde(rename = "storeID")]
    pub store_id: u32,
    #[serde(rename = "storeName")]
    pub store_name: String,
    #[serde(rename = "supplierID")]
    pub supplier_id: u32,
    #[serde(rename = "supplierName")]
    pub supplier_name: String,
}

/// One row of the sales fact table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactSale {
    pub order_id: String,
    pub customer_id: String,
    pub gender: String,
    pub age: String,
    pub city_category: String,
    pub product_id: String,
    pub product_category: String,
    pub store_id: u32,
    pub store_name: String,
    pub supplier_id: u32,
    pub supplier_name: String,
    pub date: chrono::NaiveDate,
    pub day_of_month: u32,
    pub day_of_week: String,
    pub month: u32,
    pub month_name: String,
    pub year: i32,
    pub quarter: u32,
    pub is_weekend: bool,
    pub season: Season,
    pub quantity: u32,
    pub total_amount: f64,
}

/// Meteorological season of a sale date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Season {
    Spring,
    Summer,
    Fall,
    Winter,
}

impl Season {
    /// Season for a 1-based month: Mar–May spring, Jun–Aug summer,
    /// Sep–Nov fall, otherwise winter.
    #[must_use]
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Self::Spring,
            6..=8 => Self::Summer,
            9..=11 => Self::Fall,
            _ => Self::Winter,
        }
    }
}
