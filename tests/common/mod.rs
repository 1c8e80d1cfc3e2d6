//! In-process stand-in for the service, speaking the wire protocol over a
//! duplex stream.

#![allow(dead_code)]

use ensemble_client::protocol::{encode_view, DownType, Precursor, UpType, WireReader, WireWriter};
use ensemble_client::{Connection, View, ViewId};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

/// A request as received by the service.
#[derive(Debug)]
pub struct Received {
    pub id: i32,
    pub tag: i32,
    pub header_len: usize,
    /// Header bytes after id and tag.
    pub body: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Received {
    pub fn is(&self, down: DownType) -> bool {
        self.tag == down.tag()
    }

    pub fn body(&self) -> WireReader<'_> {
        WireReader::new(&self.body)
    }
}

pub struct MockService {
    stream: DuplexStream,
}

/// A connection attached to a fresh mock service.
pub fn connect() -> (Connection, MockService) {
    connect_with_capacity(256 * 1024)
}

/// Like [`connect`], with a pipe that holds at most `capacity` bytes in each
/// direction.
pub fn connect_with_capacity(capacity: usize) -> (Connection, MockService) {
    let (client, service) = duplex(capacity);
    (
        Connection::builder().attach(client),
        MockService { stream: service },
    )
}

pub fn view(nmembers: usize, rank: usize, ltime: i32) -> View {
    let members: Vec<String> = (0..nmembers).map(|i| format!("Endpt:{}", i)).collect();
    View {
        version: "2.01".to_string(),
        group: "chat".to_string(),
        protocol: "Top:Gmp:Bottom".to_string(),
        coordinator_rank: 0,
        ltime,
        primary: true,
        uses_group_daemon: false,
        transfer_view: false,
        merged_view_ids: Vec::new(),
        parameters: String::new(),
        uptime: 12.5,
        addresses: (0..nmembers).map(|i| format!("Addr:{}", i)).collect(),
        endpoint: members[rank].clone(),
        address: format!("Addr:{}", rank),
        rank,
        name: format!("{}:name", members[rank]),
        members,
        nmembers,
        view_id: ViewId::new(ltime, "Endpt:0"),
        am_coordinator: rank == 0,
        key: None,
    }
}

fn routing(id: i32, up: UpType) -> WireWriter {
    let mut w = WireWriter::new();
    w.write_int32(id);
    w.write_int32(up.tag());
    w
}

impl MockService {
    /// Read one request frame.
    pub async fn read_downcall(&mut self) -> Received {
        let mut pre = [0u8; 8];
        self.stream.read_exact(&mut pre).await.unwrap();
        let pre = Precursor::decode(&pre).unwrap();
        assert!(pre.header_len >= 8, "header too short: {}", pre.header_len);
        assert!(pre.payload_len >= 0);

        let mut header = vec![0u8; pre.header_len as usize];
        self.stream.read_exact(&mut header).await.unwrap();
        let mut payload = vec![0u8; pre.payload_len as usize];
        self.stream.read_exact(&mut payload).await.unwrap();

        let mut r = WireReader::new(&header);
        let id = r.read_int32().unwrap();
        let tag = r.read_int32().unwrap();
        Received {
            id,
            tag,
            header_len: header.len(),
            body: header[8..].to_vec(),
            payload,
        }
    }

    /// Send a raw notification frame.
    pub async fn send_raw(&mut self, header: &[u8], payload: &[u8]) {
        let pre = Precursor::new(header.len() as i32, payload.len() as i32);
        self.stream.write_all(&pre.encode()).await.unwrap();
        self.stream.write_all(header).await.unwrap();
        self.stream.write_all(payload).await.unwrap();
    }

    /// Write arbitrary bytes, such as the start of a frame.
    pub async fn send_partial(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    pub async fn send_view(&mut self, id: i32, view: &View) {
        let mut w = routing(id, UpType::View);
        encode_view(&mut w, view).unwrap();
        self.send_raw(w.as_slice(), b"").await;
    }

    pub async fn send_cast(&mut self, id: i32, origin: i32, data: &[u8]) {
        let mut w = routing(id, UpType::Cast);
        w.write_int32(origin);
        self.send_raw(w.as_slice(), data).await;
    }

    pub async fn send_send(&mut self, id: i32, origin: i32, data: &[u8]) {
        let mut w = routing(id, UpType::Send);
        w.write_int32(origin);
        self.send_raw(w.as_slice(), data).await;
    }

    pub async fn send_heartbeat(&mut self, id: i32, time: f64) {
        let mut w = routing(id, UpType::Heartbeat);
        w.write_time(time);
        self.send_raw(w.as_slice(), b"").await;
    }

    pub async fn send_block(&mut self, id: i32) {
        let w = routing(id, UpType::Block);
        self.send_raw(w.as_slice(), b"").await;
    }

    pub async fn send_exit(&mut self, id: i32) {
        let w = routing(id, UpType::Exit);
        self.send_raw(w.as_slice(), b"").await;
    }

    pub fn close(self) {
        drop(self.stream);
    }
}
