//! Header layouts of requests sent to the service.

use super::codec::WireWriter;
use super::wire_format::{limits, DownType};
use crate::error::{EnsembleError, Result};
use crate::join_ops::JoinOptions;
use crate::registry::SessionId;

/// A request, borrowed from the caller for the duration of one encode.
#[derive(Debug, Clone, Copy)]
pub enum Downcall<'a> {
    Join(&'a JoinOptions),
    /// Multicast; the payload carries the data.
    Cast,
    /// Send to a set of ranks; the payload carries the data.
    Send(&'a [usize]),
    /// Send to one rank; the payload carries the data.
    Send1(usize),
    Suspect(&'a [usize]),
    XferDone,
    Protocol(&'a str),
    Properties(&'a str),
    Leave,
    Prompt,
    Rekey,
    BlockOk,
}

impl Downcall<'_> {
    pub fn down_type(&self) -> DownType {
        match self {
            Downcall::Join(_) => DownType::Join,
            Downcall::Cast => DownType::Cast,
            Downcall::Send(_) => DownType::Send,
            Downcall::Send1(_) => DownType::Send1,
            Downcall::Suspect(_) => DownType::Suspect,
            Downcall::XferDone => DownType::XferDone,
            Downcall::Protocol(_) => DownType::Protocol,
            Downcall::Properties(_) => DownType::Properties,
            Downcall::Leave => DownType::Leave,
            Downcall::Prompt => DownType::Prompt,
            Downcall::Rekey => DownType::Rekey,
            Downcall::BlockOk => DownType::BlockOk,
        }
    }

    /// Append `[id][tag][body]` to `w`.
    pub fn encode(&self, id: SessionId, w: &mut WireWriter) -> Result<()> {
        w.write_int32(id.get());
        w.write_int32(self.down_type().tag());
        match *self {
            Downcall::Join(opts) => encode_join(w, opts)?,
            Downcall::Send(ranks) | Downcall::Suspect(ranks) => {
                let ranks = ranks_to_wire(ranks)?;
                w.write_int32_array(&ranks);
            }
            Downcall::Send1(rank) => w.write_int32(rank_to_wire(rank)?),
            Downcall::Protocol(protocol) => {
                w.write_string("protocol", protocol, limits::PROTOCOL)?
            }
            Downcall::Properties(properties) => {
                w.write_string("properties", properties, limits::PROPERTIES)?
            }
            Downcall::Cast
            | Downcall::XferDone
            | Downcall::Leave
            | Downcall::Prompt
            | Downcall::Rekey
            | Downcall::BlockOk => {}
        }
        Ok(())
    }
}

fn encode_join(w: &mut WireWriter, opts: &JoinOptions) -> Result<()> {
    w.write_time(opts.heartbeat_rate);
    w.write_string("transports", &opts.transports, limits::TRANSPORT)?;
    w.write_opt_string("protocol", opts.protocol.as_deref(), limits::PROTOCOL)?;
    w.write_string("group name", &opts.group_name, limits::GROUP_NAME)?;
    w.write_string("properties", &opts.properties, limits::PROPERTIES)?;
    w.write_bool(opts.use_properties);
    w.write_bool(opts.use_group_daemon);
    w.write_opt_string("parameters", opts.parameters.as_deref(), limits::PARAMETERS)?;
    w.write_bool(opts.client);
    w.write_bool(opts.debug);
    w.write_opt_string("principal", opts.principal.as_deref(), limits::PRINCIPAL)?;
    w.write_key(opts.key.as_ref())?;
    w.write_bool(opts.secure);
    Ok(())
}

fn rank_to_wire(rank: usize) -> Result<i32> {
    i32::try_from(rank)
        .map_err(|_| EnsembleError::InvalidArgument(format!("rank {} out of range", rank)))
}

fn ranks_to_wire(ranks: &[usize]) -> Result<Vec<i32>> {
    ranks.iter().map(|&r| rank_to_wire(r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::WireReader;

    fn encode(call: Downcall<'_>) -> Vec<u8> {
        let mut w = WireWriter::new();
        call.encode(SessionId::from_raw(7), &mut w).unwrap();
        w.as_slice().to_vec()
    }

    #[test]
    fn test_empty_bodies() {
        for (call, tag) in [
            (Downcall::Cast, 1),
            (Downcall::XferDone, 5),
            (Downcall::Leave, 8),
            (Downcall::Prompt, 9),
            (Downcall::Rekey, 10),
            (Downcall::BlockOk, 11),
        ] {
            assert_eq!(encode(call), vec![0, 0, 0, 7, 0, 0, 0, tag]);
        }
    }

    #[test]
    fn test_send_ranks() {
        let bytes = encode(Downcall::Send(&[0, 2]));
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_int32().unwrap(), 7);
        assert_eq!(r.read_int32().unwrap(), DownType::Send.tag());
        assert_eq!(r.read_int32_array("dests").unwrap(), vec![0, 2]);
        r.finish().unwrap();
    }

    #[test]
    fn test_send1_and_protocol() {
        let bytes = encode(Downcall::Send1(4));
        assert_eq!(&bytes[4..], &[0, 0, 0, 3, 0, 0, 0, 4]);

        let bytes = encode(Downcall::Protocol("Top:Bottom"));
        let mut r = WireReader::new(&bytes[8..]);
        assert_eq!(r.read_string("protocol", limits::PROTOCOL).unwrap(), "Top:Bottom");
        r.finish().unwrap();
    }

    #[test]
    fn test_join_field_order() {
        let opts = JoinOptions::new("chat").principal("bob").key([9u8; 32]);
        let bytes = encode(Downcall::Join(&opts));
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_int32().unwrap(), 7);
        assert_eq!(r.read_int32().unwrap(), DownType::Join.tag());
        assert_eq!(r.read_time().unwrap(), 10.0);
        assert_eq!(r.read_string("t", limits::TRANSPORT).unwrap(), "DEERING");
        assert_eq!(r.read_string("p", limits::PROTOCOL).unwrap(), "");
        assert_eq!(r.read_string("g", limits::GROUP_NAME).unwrap(), "chat");
        assert_eq!(
            r.read_string("pr", limits::PROPERTIES).unwrap(),
            crate::join_ops::DEFAULT_PROPERTIES
        );
        assert!(r.read_bool().unwrap());
        assert!(!r.read_bool().unwrap());
        assert_eq!(r.read_string("pa", limits::PARAMETERS).unwrap(), "");
        assert!(!r.read_bool().unwrap());
        assert!(!r.read_bool().unwrap());
        assert_eq!(r.read_string("pn", limits::PRINCIPAL).unwrap(), "bob");
        assert_eq!(r.read_key().unwrap(), Some([9u8; 32]));
        assert!(!r.read_bool().unwrap());
        r.finish().unwrap();
    }
}
