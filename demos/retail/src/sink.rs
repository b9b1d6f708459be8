//! Fact-table sink: enriches pairs and writes JSON lines.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use hybridjoin_core::{MatchSink, MatchedPair, SinkError};

use crate::enrich::{enrich, ProductCatalogue};
use crate::types::{Customer, Transaction};

/// Counters shared with `main` for the final report.
#[derive(Debug, Default)]
pub struct FactStats {
    pub written: AtomicU64,
    pub dropped: AtomicU64,
}

/// Writes one [`FactSale`](crate::types::FactSale) JSON line per pair.
///
/// Pairs that cannot be enriched are dropped with a warning and counted;
/// they are not sink failures.
pub struct FactSaleSink<W> {
    catalogue: Arc<ProductCatalogue>,
    writer: BufWriter<W>,
    stats: Arc<FactStats>,
    buf: Vec<u8>,
}

impl<W: AsyncWrite + Unpin + Send> FactSaleSink<W> {
    pub fn new(catalogue: Arc<ProductCatalogue>, writer: W, stats: Arc<FactStats>) -> Self {
        Self {
            catalogue,
            writer: BufWriter::new(writer),
            stats,
            buf: Vec::with_capacity(512),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> MatchSink<Transaction, Customer> for FactSaleSink<W> {
    async fn accept(&mut self, pair: MatchedPair<Transaction, Customer>) -> Result<(), SinkError> {
        let fact = match enrich(&pair, &self.catalogue) {
            Ok(fact) => fact,
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(order = %pair.tuple.payload().order_id, error = %e, "Dropping sale");
                return Ok(());
            }
        };

        self.buf.clear();
        serde_json::to_writer(&mut self.buf, &fact).map_err(|e| SinkError::Serde(e.to_string()))?;
        self.buf.push(b'\n');
        self.writer.write_all(&self.buf).await?;
        self.stats.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().await?;
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "fact_sales"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Product;
    use hybridjoin_core::StreamTuple;

    fn pair(order_id: &str, product_id: &str) -> MatchedPair<Transaction, Customer> {
        MatchedPair::new(
            Arc::new(StreamTuple::new(
                "C1",
                Transaction {
                    order_id: order_id.into(),
                    customer_id: "C1".into(),
                    product_id: product_id.into(),
                    quantity: 2,
                    date: "2021-03-15".into(),
                },
            )),
            Arc::new(Customer {
                customer_id: "C1".into(),
                gender: "M".into(),
                age: "18-25".into(),
                occupation: 4,
                city_category: "A".into(),
                stay_in_current_city_years: "4+".into(),
                marital_status: 0,
            }),
        )
    }

    #[tokio::test]
    async fn test_writes_facts_and_drops_unknown_products() {
        let mut catalogue = ProductCatalogue::default();
        catalogue.insert(Product {
            product_id: "P1".into(),
            product_category: "Toys".into(),
            price: 3.0,
            store_id: 1,
            store_name: "North".into(),
            supplier_id: 2,
            supplier_name: "Kite Co".into(),
        });
        let stats = Arc::new(FactStats::default());
        let mut sink = FactSaleSink::new(Arc::new(catalogue), Vec::new(), Arc::clone(&stats));

        sink.accept(pair("O1", "P1")).await.unwrap();
        sink.accept(pair("O2", "P9")).await.unwrap();
        sink.flush().await.unwrap();

        assert_eq!(stats.written.load(Ordering::Relaxed), 1);
        assert_eq!(stats.dropped.load(Ordering::Relaxed), 1);

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let row: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(row["order_id"], "O1");
        assert_eq!(row["total_amount"], 6.0);
        assert_eq!(row["season"], "Spring");
        assert_eq!(row["date"], "2021-03-15");
        assert_eq!(row["day_of_month"], 15);
        assert_eq!(row["month"], 3);
        assert_eq!(row["year"], 2021);
        assert_eq!(row["day_of_week"], "Monday");
    }
}
