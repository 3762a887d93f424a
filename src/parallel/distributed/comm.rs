//! Message-passing primitives shared by every transport.
//!
//! A transport only has to move [`Message`]s between two ranks. The
//! collectives (broadcast, barrier, max-reduction) are provided methods of
//! [`Communicator`] built on top of `send`/`recv` with rank
//! [`ROOT_RANK`] at the centre of a star, so every transport gets the same
//! ordering guarantees.

use crate::error::{communication_error, dimension_error, MatbenchError, Result};
use crate::ROOT_RANK;

/// A unit of communication between two ranks.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A full operand buffer.
    Matrix(Vec<f64>),
    /// A rank has reached the barrier.
    Arrive,
    /// Every rank has reached the barrier.
    Release,
    /// A rank's local compute time in seconds.
    Elapsed(f64),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Matrix(_) => "Matrix",
            Message::Arrive => "Arrive",
            Message::Release => "Release",
            Message::Elapsed(_) => "Elapsed",
        }
    }
}

fn unexpected(expected: &str, source: usize, got: &Message) -> MatbenchError {
    communication_error(format!(
        "expected {expected} from rank {source}, got {}",
        got.kind()
    ))
}

/// One participant of a fixed-size group of ranks.
pub trait Communicator {
    /// This participant's rank, `0..size`.
    fn rank(&self) -> usize;

    /// Number of participants.
    fn size(&self) -> usize;

    /// Delivers `message` to `dest`.
    fn send(&mut self, dest: usize, message: &Message) -> Result<()>;

    /// Blocks until the next message from `source` arrives.
    fn recv(&mut self, source: usize) -> Result<Message>;

    fn is_root(&self) -> bool {
        self.rank() == ROOT_RANK
    }

    /// Copies the root's `buf` into every other rank's `buf`.
    ///
    /// All ranks must pass buffers of the same length.
    fn broadcast(&mut self, buf: &mut [f64]) -> Result<()> {
        if self.is_root() {
            let message = Message::Matrix(buf.to_vec());
            for dest in (0..self.size()).filter(|&r| r != ROOT_RANK) {
                self.send(dest, &message)?;
            }
            return Ok(());
        }

        match self.recv(ROOT_RANK)? {
            Message::Matrix(data) if data.len() == buf.len() => {
                buf.copy_from_slice(&data);
                Ok(())
            }
            Message::Matrix(data) => Err(dimension_error(
                buf.len(),
                data.len(),
                "broadcast payload does not fit the receive buffer",
            )),
            other => Err(unexpected("Matrix", ROOT_RANK, &other)),
        }
    }

    /// Returns only after every rank has called `barrier`.
    fn barrier(&mut self) -> Result<()> {
        if self.is_root() {
            for source in (0..self.size()).filter(|&r| r != ROOT_RANK) {
                match self.recv(source)? {
                    Message::Arrive => {}
                    other => return Err(unexpected("Arrive", source, &other)),
                }
            }
            for dest in (0..self.size()).filter(|&r| r != ROOT_RANK) {
                self.send(dest, &Message::Release)?;
            }
            return Ok(());
        }

        self.send(ROOT_RANK, &Message::Arrive)?;
        match self.recv(ROOT_RANK)? {
            Message::Release => Ok(()),
            other => Err(unexpected("Release", ROOT_RANK, &other)),
        }
    }

    /// Maximum of `value` over all ranks, available at the root only.
    fn reduce_max(&mut self, value: f64) -> Result<Option<f64>> {
        if self.is_root() {
            let mut max = value;
            for source in (0..self.size()).filter(|&r| r != ROOT_RANK) {
                match self.recv(source)? {
                    Message::Elapsed(v) => max = max.max(v),
                    other => return Err(unexpected("Elapsed", source, &other)),
                }
            }
            return Ok(Some(max));
        }

        self.send(ROOT_RANK, &Message::Elapsed(value))?;
        Ok(None)
    }
}
