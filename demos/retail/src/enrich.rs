//! Turns matched (transaction, customer) pairs into fact rows.

use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use rustc_hash::FxHashMap;

use hybridjoin_core::MatchedPair;

use crate::types::{Customer, FactSale, Product, Season, Transaction};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M"];

/// Reasons a pair yields no fact row.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnrichError {
    /// The transaction's product is not in the catalogue.
    #[error("unknown product '{0}'")]
    UnknownProduct(String),

    /// The transaction date could not be parsed.
    #[error("unparsable date '{0}'")]
    BadDate(String),
}

/// In-memory product catalogue keyed by product id.
#[derive(Debug, Default)]
pub struct ProductCatalogue {
    products: FxHashMap<String, Product>,
}

impl ProductCatalogue {
    /// Loads `product_master_data.csv`-style input. Fields are trimmed.
    ///
    /// # Errors
    ///
    /// Returns the CSV error for an unreadable file or malformed row.
    pub fn load_csv(path: impl AsRef<Path>) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;
        let mut catalogue = Self::default();
        for row in reader.deserialize::<Product>() {
            catalogue.insert(row?);
        }
        Ok(catalogue)
    }

    /// Adds or replaces a product.
    pub fn insert(&mut self, product: Product) {
        self.products.insert(product.product_id.clone(), product);
    }

    /// Looks up a product.
    #[must_use]
    pub fn get(&self, product_id: &str) -> Option<&Product> {
        self.products.get(product_id)
    }

    /// Number of products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Returns `true` if the catalogue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Parses a transaction date in any of the accepted layouts.
///
/// # Errors
///
/// Returns [`EnrichError::BadDate`] if no layout matches.
pub fn parse_date(raw: &str) -> Result<NaiveDate, EnrichError> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
                .map(|dt| dt.date())
        })
        .ok_or_else(|| EnrichError::BadDate(raw.to_string()))
}

/// Builds the fact row for one matched pair.
///
/// # Errors
///
/// Returns [`EnrichError`] when the product is unknown or the date is
/// unparsable; such pairs are dropped by the caller.
pub fn enrich(
    pair: &MatchedPair<Transaction, Customer>,
    catalogue: &ProductCatalogue,
) -> Result<FactSale, EnrichError> {
    let tx = pair.tuple.payload();
    let customer = pair.record.as_ref();
    let product = catalogue
        .get(&tx.product_id)
        .ok_or_else(|| EnrichError::UnknownProduct(tx.product_id.clone()))?;
    let date = parse_date(&tx.date)?;

    Ok(FactSale {
        order_id: tx.order_id.clone(),
        customer_id: customer.customer_id.clone(),
        gender: customer.gender.clone(),
        age: customer.age.clone(),
        city_category: customer.city_category.clone(),
        product_id: product.product_id.clone(),
        product_category: product.product_category.clone(),
        store_id: product.store_id,
        store_name: product.store_name.clone(),
        supplier_id: product.supplier_id,
        supplier_name: product.supplier_name.clone(),
        date,
        day_of_month: date.day(),
        day_of_week: date.format("%A").to_string(),
        month: date.month(),
        month_name: date.format("%B").to_string(),
        year: date.year(),
        quarter: (date.month() - 1) / 3 + 1,
        is_weekend: matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
        season: Season::from_month(date.month()),
        quantity: tx.quantity,
        total_amount: f64::from(tx.quantity) * product.price,
    })
}
