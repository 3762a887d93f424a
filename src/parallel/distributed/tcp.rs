//! Multi-process transport over loopback TCP.
//!
//! The world is a star: rank 0 accepts one connection per other rank, and
//! every other rank holds a single connection to rank 0. That is all the
//! collectives in [`Communicator`] need.
//!
//! Frames are a tag byte followed by a little-endian payload:
//!
//! | tag | frame   | payload                      |
//! |-----|---------|------------------------------|
//! | 0   | Hello   | `u64` rank of the connector  |
//! | 1   | Matrix  | `u64` count, then `count` f64 |
//! | 2   | Arrive  | none                         |
//! | 3   | Release | none                         |
//! | 4   | Elapsed | one f64                      |

use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};

use tracing::debug;

use crate::error::{communication_error, Result};
use crate::ROOT_RANK;

use super::comm::{Communicator, Message};

const TAG_HELLO: u8 = 0;
const TAG_MATRIX: u8 = 1;
const TAG_ARRIVE: u8 = 2;
const TAG_RELEASE: u8 = 3;
const TAG_ELAPSED: u8 = 4;

/// Largest Matrix frame accepted, in elements (a 65536 x 65536 operand).
const MAX_MATRIX_ELEMENTS: u64 = 1 << 32;
/// Matrix payloads are read in pieces of this many bytes.
const READ_CHUNK_BYTES: usize = 1 << 16;

#[derive(Debug)]
struct Link {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Link {
    fn new(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Link {
            reader,
            writer: BufWriter::new(stream),
        })
    }
}

/// Endpoint of one rank in a multi-process world.
#[derive(Debug)]
pub struct TcpComm {
    rank: usize,
    size: usize,
    // indexed by peer rank; only the root has more than one
    links: Vec<Option<Link>>,
}

/// Listening side of rank 0 while the other ranks connect.
#[derive(Debug)]
pub struct Coordinator {
    listener: TcpListener,
}

impl Coordinator {
    /// Binds an ephemeral loopback port.
    pub fn bind() -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        Ok(Coordinator { listener })
    }

    /// Address the other ranks should connect to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Waits until ranks `1..size` have all connected and returns the root endpoint.
    ///
    /// Blocks for as long as any rank is missing.
    pub fn accept(self, size: usize) -> Result<TcpComm> {
        let mut links: Vec<Option<Link>> = (0..size).map(|_| None).collect();

        for _ in 1..size {
            let (stream, peer) = self.listener.accept()?;
            let mut link = Link::new(stream)?;
            let rank = match read_tag(&mut link.reader)? {
                TAG_HELLO => read_u64(&mut link.reader)? as usize,
                tag => {
                    return Err(communication_error(format!(
                        "expected Hello from {peer}, got tag {tag}"
                    )))
                }
            };
            if rank == ROOT_RANK || rank >= size {
                return Err(communication_error(format!(
                    "{peer} claimed rank {rank} in a world of {size}"
                )));
            }
            if links[rank].is_some() {
                return Err(communication_error(format!("rank {rank} connected twice")));
            }
            debug!(rank, %peer, "rank connected");
            links[rank] = Some(link);
        }

        Ok(TcpComm {
            rank: ROOT_RANK,
            size,
            links,
        })
    }
}

impl TcpComm {
    /// Connects a non-root rank to the coordinator at `addr`.
    pub fn connect(addr: SocketAddr, rank: usize, size: usize) -> Result<Self> {
        if rank == ROOT_RANK || rank >= size {
            return Err(communication_error(format!(
                "rank {rank} cannot connect in a world of {size}"
            )));
        }

        let mut link = Link::new(TcpStream::connect(addr)?)?;
        link.writer.write_all(&[TAG_HELLO])?;
        link.writer.write_all(&(rank as u64).to_le_bytes())?;
        link.writer.flush()?;

        let mut links: Vec<Option<Link>> = (0..size).map(|_| None).collect();
        links[ROOT_RANK] = Some(link);
        Ok(TcpComm { rank, size, links })
    }

    fn link(&mut self, peer: usize) -> Result<&mut Link> {
        let rank = self.rank;
        self.links
            .get_mut(peer)
            .and_then(Option::as_mut)
            .ok_or_else(|| communication_error(format!("rank {rank} has no link to rank {peer}")))
    }
}

impl Communicator for TcpComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&mut self, dest: usize, message: &Message) -> Result<()> {
        let writer = &mut self.link(dest)?.writer;
        write_message(writer, message)?;
        writer.flush()?;
        Ok(())
    }

    fn recv(&mut self, source: usize) -> Result<Message> {
        read_message(&mut self.link(source)?.reader)
    }
}

fn write_message<W: Write>(w: &mut W, message: &Message) -> Result<()> {
    match message {
        Message::Matrix(data) => {
            w.write_all(&[TAG_MATRIX])?;
            w.write_all(&(data.len() as u64).to_le_bytes())?;
            for value in data {
                w.write_all(&value.to_le_bytes())?;
            }
        }
        Message::Arrive => w.write_all(&[TAG_ARRIVE])?,
        Message::Release => w.write_all(&[TAG_RELEASE])?,
        Message::Elapsed(seconds) => {
            w.write_all(&[TAG_ELAPSED])?;
            w.write_all(&seconds.to_le_bytes())?;
        }
    }
    Ok(())
}

fn read_message<R: Read>(r: &mut R) -> Result<Message> {
    match read_tag(r)? {
        TAG_MATRIX => read_matrix(r).map(Message::Matrix),
        TAG_ARRIVE => Ok(Message::Arrive),
        TAG_RELEASE => Ok(Message::Release),
        TAG_ELAPSED => Ok(Message::Elapsed(f64::from_bits(read_u64(r)?))),
        tag => Err(communication_error(format!("unknown frame tag {tag}"))),
    }
}

/// Reads a Matrix payload. The buffer grows with the bytes actually received,
/// so a bogus count fails on a short read instead of a huge allocation.
fn read_matrix<R: Read>(r: &mut R) -> Result<Vec<f64>> {
    let count = read_u64(r)?;
    if count > MAX_MATRIX_ELEMENTS {
        return Err(communication_error(format!(
            "matrix frame of {count} elements exceeds the limit of {MAX_MATRIX_ELEMENTS}"
        )));
    }
    let byte_len = usize::try_from(count)
        .ok()
        .and_then(|count| count.checked_mul(8))
        .ok_or_else(|| {
            communication_error(format!("matrix frame of {count} elements is too large"))
        })?;

    let mut data = Vec::with_capacity(byte_len.min(READ_CHUNK_BYTES) / 8);
    let mut chunk = vec![0u8; byte_len.min(READ_CHUNK_BYTES)];
    let mut remaining = byte_len;
    while remaining > 0 {
        let len = remaining.min(chunk.len());
        r.read_exact(&mut chunk[..len])?;
        data.extend(chunk[..len].chunks_exact(8).map(|raw| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(raw);
            f64::from_le_bytes(bytes)
        }));
        remaining -= len;
    }
    Ok(data)
}

fn read_tag<R: Read>(r: &mut R) -> Result<u8> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag)?;
    Ok(tag[0])
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut raw = [0u8; 8];
    r.read_exact(&mut raw)?;
    Ok(u64::from_le_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_frames_decode_in_order() {
        let mut wire = Vec::new();
        write_message(&mut wire, &Message::Matrix(vec![0.5, -1.25])).unwrap();
        write_message(&mut wire, &Message::Arrive).unwrap();
        write_message(&mut wire, &Message::Elapsed(0.125)).unwrap();
        assert_eq!(wire.len(), 1 + 8 + 16 + 1 + 1 + 8);

        let mut r = Cursor::new(wire);
        assert_eq!(read_message(&mut r).unwrap(), Message::Matrix(vec![0.5, -1.25]));
        assert_eq!(read_message(&mut r).unwrap(), Message::Arrive);
        assert_eq!(read_message(&mut r).unwrap(), Message::Elapsed(0.125));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut r = Cursor::new(vec![9u8]);
        assert!(read_message(&mut r).is_err());
    }

    #[test]
    fn test_truncated_frame_is_io_error() {
        let mut r = Cursor::new(vec![TAG_MATRIX, 3, 0, 0, 0, 0, 0, 0, 0, 1, 2]);
        assert!(matches!(read_message(&mut r), Err(crate::MatbenchError::Io(_))));
    }

    #[test]
    fn test_oversized_matrix_count_rejected() {
        for count in [u64::MAX / 4, u64::MAX, MAX_MATRIX_ELEMENTS + 1] {
            let mut wire = vec![TAG_MATRIX];
            wire.extend_from_slice(&count.to_le_bytes());
            let mut r = Cursor::new(wire);
            assert!(
                matches!(read_message(&mut r), Err(crate::MatbenchError::Communication { .. })),
                "count {count}"
            );
        }
    }

    #[test]
    fn test_large_count_with_short_payload_is_io_error() {
        let mut wire = vec![TAG_MATRIX];
        wire.extend_from_slice(&MAX_MATRIX_ELEMENTS.to_le_bytes());
        wire.extend_from_slice(&1.5f64.to_le_bytes());
        let mut r = Cursor::new(wire);
        assert!(matches!(read_message(&mut r), Err(crate::MatbenchError::Io(_))));
    }

    #[test]
    fn test_matrix_spanning_several_chunks() {
        let data: Vec<f64> = (0..READ_CHUNK_BYTES / 8 * 2 + 3).map(|x| x as f64 * 0.5).collect();
        let mut wire = Vec::new();
        write_message(&mut wire, &Message::Matrix(data.clone())).unwrap();
        let mut r = Cursor::new(wire);
        assert_eq!(read_message(&mut r).unwrap(), Message::Matrix(data));
    }
}
