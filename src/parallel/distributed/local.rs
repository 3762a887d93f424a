//! In-process transport: each rank runs on its own thread and owns its own
//! buffers. Ranks are connected by a full mesh of mpsc channels, one per
//! ordered pair, so `recv(source)` never sees another sender's traffic.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::error::{communication_error, Result};

use super::comm::{Communicator, Message};

/// Endpoint of one rank in an in-process world.
#[derive(Debug)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    // indexed by destination rank
    outboxes: Vec<Option<Sender<Message>>>,
    // indexed by source rank
    inboxes: Vec<Option<Receiver<Message>>>,
}

/// Creates the endpoints of a world of `size` ranks, in rank order.
pub fn world(size: usize) -> Vec<LocalComm> {
    let mut outboxes: Vec<Vec<Option<Sender<Message>>>> =
        (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
    let mut inboxes: Vec<Vec<Option<Receiver<Message>>>> =
        (0..size).map(|_| (0..size).map(|_| None).collect()).collect();

    for src in 0..size {
        for dst in (0..size).filter(|&dst| dst != src) {
            let (tx, rx) = mpsc::channel();
            outboxes[src][dst] = Some(tx);
            inboxes[dst][src] = Some(rx);
        }
    }

    outboxes
        .into_iter()
        .zip(inboxes)
        .enumerate()
        .map(|(rank, (outboxes, inboxes))| LocalComm {
            rank,
            size,
            outboxes,
            inboxes,
        })
        .collect()
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&mut self, dest: usize, message: &Message) -> Result<()> {
        let rank = self.rank;
        let outbox = self
            .outboxes
            .get(dest)
            .and_then(Option::as_ref)
            .ok_or_else(|| communication_error(format!("rank {rank} has no link to rank {dest}")))?;
        outbox
            .send(message.clone())
            .map_err(|_| communication_error(format!("rank {dest} hung up")))
    }

    fn recv(&mut self, source: usize) -> Result<Message> {
        let rank = self.rank;
        let inbox = self
            .inboxes
            .get(source)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                communication_error(format!("rank {rank} has no link from rank {source}"))
            })?;
        inbox
            .recv()
            .map_err(|_| communication_error(format!("rank {source} hung up")))
    }
}
