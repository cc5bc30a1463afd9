//! Concurrent decryption with ordered output.
//!
//! Reads from the stream stay serial: one reader thread reads chunks in
//! order and queues them. A pool of workers decrypts queued chunks, and the
//! calling thread puts finished chunks back in order with an [`Assembler`].
//!
//! ```text
//! stream -> reader -> [jobs] -> worker x N -> [results] -> Assembler -> Vec<u8>
//! ```
//!
//! The first error from any thread aborts the whole operation. Dropping the
//! results receiver makes the workers stop, which in turn makes the reader
//! stop, and all threads are joined before the error is returned.

use std::{collections::BTreeMap, io::Read, thread};

use crate::{
    config::Config,
    decrypt::{chunks, decrypt_chunk, preallocation, read_chunk},
    error::{Error, Result},
    key::derive_key,
};

/// Reorder buffer for chunks that complete out of order.
///
/// Chunks are appended to the output strictly by index, regardless of the
/// order they are inserted in.
#[derive(Clone, Debug, Default)]
pub struct Assembler {
    /// Index of the next chunk to append.
    next: u64,

    /// Chunks that arrived ahead of `next`.
    pending: BTreeMap<u64, Vec<u8>>,

    output: Vec<u8>,
}

impl Assembler {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            output: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Adds chunk `index`, appending it and any chunks it unblocks.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::InvalidArgument` if chunk `index` was inserted
    /// before.
    pub fn insert(&mut self, index: u64, chunk: Vec<u8>) -> Result<()> {
        if index < self.next || self.pending.contains_key(&index) {
            return Err(
                Error::invalid_argument("assemble", "chunk was already inserted").at_chunk(index),
            );
        }

        if index > self.next {
            self.pending.insert(index, chunk);
            return Ok(());
        }

        self.output.extend_from_slice(&chunk);
        self.next += 1;

        while let Some(chunk) = self.pending.remove(&self.next) {
            self.output.extend_from_slice(&chunk);
            self.next += 1;
        }

        Ok(())
    }

    /// Number of chunks appended so far.
    #[must_use]
    pub fn appended(&self) -> u64 {
        self.next
    }

    /// Returns the output.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::TruncatedStream` if a chunk is missing before a
    /// chunk that was inserted.
    pub fn finish(self) -> Result<Vec<u8>> {
        if !self.pending.is_empty() {
            return Err(Error::truncated_stream(
                "assemble",
                format!("{} chunks are waiting on a missing chunk", self.pending.len()),
            )
            .at_chunk(self.next));
        }

        Ok(self.output)
    }
}

/// Reads and decrypts a whole stream like [`decrypt`](crate::decrypt::decrypt),
/// decrypting chunks on `config.workers` threads.
///
/// The output is identical to that of the sequential version.
///
/// # Errors
///
/// Same as [`decrypt`](crate::decrypt::decrypt). When several chunks fail,
/// the first failure received is returned.
pub fn decrypt_parallel<R>(stream: R, id: &str, total_length: u64, config: &Config) -> Result<Vec<u8>>
where
    R: Read + Send,
{
    let key = derive_key(id);
    let mut assembler = Assembler::with_capacity(preallocation(total_length));
    debug!(
        "decrypting {total_length} bytes of track {id} on {} workers",
        config.workers
    );

    let (jobs_tx, jobs_rx) = flume::bounded::<(u64, Vec<u8>)>(config.queue_depth.get());
    let (results_tx, results_rx) = flume::unbounded::<(u64, Result<Vec<u8>>)>();

    thread::scope(|scope| {
        let reader_results = results_tx.clone();
        scope.spawn(move || {
            let mut stream = stream;
            for (index, len) in chunks(total_length) {
                let mut chunk = vec![0; len];
                if let Err(e) = read_chunk(&mut stream, index, &mut chunk) {
                    let _ = reader_results.send((index, Err(e)));
                    return;
                }

                // Fails once all workers have stopped.
                if jobs_tx.send((index, chunk)).is_err() {
                    return;
                }
            }
        });

        for _ in 0..config.workers.get() {
            let jobs = jobs_rx.clone();
            let results = results_tx.clone();
            scope.spawn(move || {
                for (index, mut chunk) in jobs.iter() {
                    let result = decrypt_chunk(&key, index, &mut chunk).map(|()| chunk);

                    // Fails once the collector has given up.
                    if results.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }

        // Only the threads hold senders and receivers now, so the results
        // channel closes when all of them are done.
        drop(jobs_rx);
        drop(results_tx);

        let outcome = results_rx
            .iter()
            .try_for_each(|(index, result)| assembler.insert(index, result?));
        drop(results_rx);
        outcome
    })?;

    assembler.finish()
}

#[cfg(test)]
mod tests {
    use std::{io, num::NonZeroUsize};

    use super::*;
    use crate::{
        decrypt::{decrypt, CHUNK_SIZE},
        error::ErrorKind,
    };

    fn config(workers: usize) -> Config {
        Config::with_workers(NonZeroUsize::new(workers).unwrap())
    }

    fn payload(len: usize) -> Vec<u8> {
        let mut rng = fastrand::Rng::with_seed(7);
        let mut data = vec![0; len];
        rng.fill(&mut data);
        data
    }

    #[test]
    fn assembles_out_of_order() {
        let chunks: Vec<Vec<u8>> = (0..6u8).map(|i| vec![i; 3]).collect();

        let mut assembler = Assembler::default();
        for index in [5, 3, 4, 1, 2, 0] {
            assembler.insert(index, chunks[index as usize].clone()).unwrap();
        }

        assert_eq!(assembler.appended(), 6);
        assert_eq!(assembler.finish().unwrap(), chunks.concat());
    }

    #[test]
    fn shuffled_completion_keeps_byte_positions() {
        let chunks: Vec<Vec<u8>> = (0..50u8).map(|i| vec![i; usize::from(i) + 1]).collect();
        let mut order: Vec<u64> = (0..50).collect();
        fastrand::Rng::with_seed(11).shuffle(&mut order);

        let mut assembler = Assembler::default();
        for index in order {
            assembler.insert(index, chunks[index as usize].clone()).unwrap();
        }

        let output = assembler.finish().unwrap();
        let mut position = 0;
        for chunk in &chunks {
            assert_eq!(output[position..position + chunk.len()], chunk[..]);
            position += chunk.len();
        }
    }

    #[test]
    fn rejects_duplicates() {
        let mut assembler = Assembler::default();
        assembler.insert(0, vec![1]).unwrap();
        assembler.insert(2, vec![3]).unwrap();

        let err = assembler.insert(0, vec![1]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(assembler.insert(2, vec![3]).is_err());
    }

    #[test]
    fn reports_gaps() {
        let mut assembler = Assembler::default();
        assembler.insert(1, vec![1]).unwrap();

        let err = assembler.finish().unwrap_err();
        assert_eq!(err.kind, ErrorKind::TruncatedStream);
        assert_eq!(err.chunk, Some(0));
    }

    #[test]
    fn matches_sequential() {
        let data = payload(20 * CHUNK_SIZE + 999);
        let sequential = decrypt(&data[..], "3135556", data.len() as u64).unwrap();

        for workers in [1, 2, 5] {
            let parallel =
                decrypt_parallel(&data[..], "3135556", data.len() as u64, &config(workers))
                    .unwrap();
            assert_eq!(parallel, sequential, "{workers} workers");
        }
    }

    #[test]
    fn empty_stream() {
        let output = decrypt_parallel(io::empty(), "3135556", 0, &config(2)).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn truncation_aborts() {
        let data = payload(10 * CHUNK_SIZE);
        let err = decrypt_parallel(&data[..], "3135556", 12 * CHUNK_SIZE as u64, &config(3))
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::TruncatedStream);
        assert_eq!(err.chunk, Some(10));
    }

    #[test]
    fn declared_length_is_not_preallocated() {
        let err = decrypt_parallel(&[0; 10][..], "3135556", u64::MAX, &config(2)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TruncatedStream);
        assert_eq!(err.chunk, Some(0));
    }

    #[test]
    fn read_error_aborts() {
        struct FailAfter(usize);
        impl Read for FailAfter {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.0 == 0 {
                    return Err(io::ErrorKind::ConnectionAborted.into());
                }
                let len = buf.len().min(self.0);
                buf[..len].fill(0);
                self.0 -= len;
                Ok(len)
            }
        }

        let err = decrypt_parallel(
            FailAfter(4 * CHUNK_SIZE),
            "3135556",
            100 * CHUNK_SIZE as u64,
            &config(2),
        )
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Io);
        assert_eq!(err.chunk, Some(4));
    }
}
