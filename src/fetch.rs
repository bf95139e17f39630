use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::{AccessionId, Batch, SequenceFormat};
use crate::entrez::EntrezClient;
use crate::error::RetrieverError;

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

pub fn partition_batches(accessions: &[AccessionId], batch_size: usize) -> Vec<Batch> {
    accessions
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            number: index + 1,
            accessions: chunk.to_vec(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPayload {
    pub body: String,
    pub records: usize,
}

#[derive(Debug)]
pub struct FormatFetch {
    pub format: SequenceFormat,
    pub attempts: usize,
    pub outcome: Result<FetchedPayload, RetrieverError>,
}

pub struct BatchFetcher<'a, E: EntrezClient, S: Sleeper> {
    client: &'a E,
    sleeper: &'a S,
    delay: Duration,
    max_retries: usize,
    calls_issued: usize,
}

impl<'a, E: EntrezClient, S: Sleeper> BatchFetcher<'a, E, S> {
    pub fn new(client: &'a E, sleeper: &'a S, delay: Duration, max_retries: usize) -> Self {
        Self {
            client,
            sleeper,
            delay,
            max_retries,
            calls_issued: 0,
        }
    }

    pub fn fetch_batch(&mut self, batch: &Batch, formats: &[SequenceFormat]) -> Vec<FormatFetch> {
        formats
            .iter()
            .map(|&format| {
                info!(
                    batch = batch.number,
                    %format,
                    accessions = batch.len(),
                    "fetching batch"
                );
                let (outcome, attempts) = self.call_with_retries(&batch.accessions, format);
                match &outcome {
                    Ok(payload) => info!(
                        batch = batch.number,
                        %format,
                        records = payload.records,
                        bytes = payload.body.len(),
                        "batch fetched"
                    ),
                    Err(err) => warn!(
                        batch = batch.number,
                        %format,
                        attempts,
                        error = %err,
                        "batch fetch failed"
                    ),
                }
                FormatFetch {
                    format,
                    attempts,
                    outcome,
                }
            })
            .collect()
    }

    pub fn fetch_all(
        &mut self,
        accessions: &[AccessionId],
        batch_size: usize,
        formats: &[SequenceFormat],
    ) -> Vec<(Batch, Vec<FormatFetch>)> {
        partition_batches(accessions, batch_size)
            .into_iter()
            .map(|batch| {
                let fetches = self.fetch_batch(&batch, formats);
                (batch, fetches)
            })
            .collect()
    }

    fn call_with_retries(
        &mut self,
        accessions: &[AccessionId],
        format: SequenceFormat,
    ) -> (Result<FetchedPayload, RetrieverError>, usize) {
        let mut attempt = 0usize;
        loop {
            self.pace();
            match self.client.fetch_batch(accessions, format) {
                Ok(body) => {
                    let payload = FetchedPayload {
                        records: format.count_records(&body),
                        body,
                    };
                    return (Ok(payload), attempt + 1);
                }
                Err(err) if attempt < self.max_retries && err.is_transient() => {
                    warn!(%format, attempt = attempt + 1, error = %err, "transient failure, retrying");
                    attempt += 1;
                }
                Err(err) => return (Err(err), attempt + 1),
            }
        }
    }

    fn pace(&mut self) {
        if self.calls_issued > 0 && !self.delay.is_zero() {
            self.sleeper.sleep(self.delay);
        }
        self.calls_issued += 1;
    }
}
