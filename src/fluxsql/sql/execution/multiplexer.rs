//! Fan-in of streaming sources into one tagged record channel.
//!
//! One forwarder task per source preserves per-source FIFO order;
//! inter-source order is not guaranteed. The merged channel closes when
//! every forwarder has finished (the last sender clone drops), which is
//! the execution loop's termination signal. Dropping the merged receiver
//! makes forwarder sends fail, unwinding the pipeline without leaks.

use crate::fluxsql::sql::execution::types::{Record, TaggedRecord};
use log::debug;
use tokio::sync::mpsc;

/// Bounded capacity of the merged channel; provides coarse back-pressure
/// to upstream readers when the execution loop stalls.
pub const MERGED_CHANNEL_CAPACITY: usize = 64;

/// Merge per-source record channels into one tagged channel.
pub fn merge_streams(
    streams: Vec<(String, mpsc::Receiver<Record>)>,
) -> mpsc::Receiver<TaggedRecord> {
    let (tx, rx) = mpsc::channel(MERGED_CHANNEL_CAPACITY);

    for (table, mut records) in streams {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(record) = records.recv().await {
                let tagged = TaggedRecord {
                    table: table.clone(),
                    record,
                };
                if tx.send(tagged).await.is_err() {
                    // Consumer is gone; stop pulling from the source
                    break;
                }
            }
            debug!("stream '{}' drained", table);
        });
    }

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fluxsql::sql::execution::types::FieldValue;

    fn record(n: i64) -> Record {
        let mut r = Record::new();
        r.insert("n", FieldValue::Integer(n));
        r
    }

    #[tokio::test]
    async fn test_merges_all_sources_and_closes() {
        let (tx_a, rx_a) = mpsc::channel(8);
        let (tx_b, rx_b) = mpsc::channel(8);
        let mut merged = merge_streams(vec![
            ("a".to_string(), rx_a),
            ("b".to_string(), rx_b),
        ]);

        tx_a.send(record(1)).await.unwrap();
        tx_b.send(record(2)).await.unwrap();
        drop(tx_a);
        drop(tx_b);

        let mut seen = Vec::new();
        while let Some(tagged) = merged.recv().await {
            seen.push(tagged.table);
        }
        seen.sort();
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_per_source_fifo_preserved() {
        let (tx, rx) = mpsc::channel(8);
        let mut merged = merge_streams(vec![("s".to_string(), rx)]);

        for i in 0..10 {
            tx.send(record(i)).await.unwrap();
        }
        drop(tx);

        let mut values = Vec::new();
        while let Some(tagged) = merged.recv().await {
            match tagged.record.get("n") {
                Some(FieldValue::Integer(i)) => values.push(*i),
                other => panic!("unexpected: {:?}", other),
            }
        }
        assert_eq!(values, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_dropping_receiver_stops_forwarders() {
        let (tx, rx) = mpsc::channel(1);
        let merged = merge_streams(vec![("s".to_string(), rx)]);
        drop(merged);

        // The forwarder exits once its send fails; the source channel then
        // reports closure to the producer side.
        for i in 0..(MERGED_CHANNEL_CAPACITY + 2) as i64 {
            if tx.send(record(i)).await.is_err() {
                return;
            }
        }
        panic!("source channel never closed after consumer drop");
    }
}
