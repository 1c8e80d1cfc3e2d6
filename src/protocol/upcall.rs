//! Header layouts of notifications received from the service.

use bytes::Bytes;

use super::codec::{WireReader, WireWriter};
use super::wire_format::{limits, UpType};
use crate::error::{EnsembleError, Result};
use crate::registry::SessionId;
use crate::view::{Event, View};

/// Read the `[id][tag]` prefix of an inbound header.
pub fn decode_routing(r: &mut WireReader<'_>) -> Result<(SessionId, UpType)> {
    let id = SessionId::from_raw(r.read_int32()?);
    let up = UpType::try_from(r.read_int32()?)?;
    Ok((id, up))
}

/// Decode the body of an upcall; `payload` is the bulk data of the frame.
pub fn decode_event(up: UpType, r: &mut WireReader<'_>, payload: Bytes) -> Result<Event> {
    let event = match up {
        UpType::View => Event::View(decode_view(r)?.into()),
        UpType::Cast => Event::Cast {
            origin: r.read_rank("origin")?,
            data: payload,
        },
        UpType::Send => Event::Send {
            origin: r.read_rank("origin")?,
            data: payload,
        },
        UpType::Heartbeat => Event::Heartbeat {
            time: r.read_time()?,
        },
        UpType::Block => Event::Block,
        UpType::Exit => Event::Exit,
    };
    Ok(event)
}

/// Decode a view body and check its rank invariants.
pub fn decode_view(r: &mut WireReader<'_>) -> Result<View> {
    let endpoint = r.read_string("endpoint", limits::ENDPOINT)?;
    let address = r.read_string("address", limits::ADDRESS)?;
    let rank = r.read_rank("rank")?;
    let name = r.read_string("name", limits::NAME)?;
    let nmembers = r.read_rank("nmembers")?;
    let view_id = r.read_view_id()?;
    let am_coordinator = r.read_bool()?;

    let version = r.read_string("version", limits::VERSION)?;
    let group = r.read_string("group", limits::GROUP_NAME)?;
    let protocol = r.read_string("protocol", limits::PROTOCOL)?;
    let coordinator_rank = r.read_rank("coordinator rank")?;
    let ltime = r.read_int32()?;
    let primary = r.read_bool()?;
    let uses_group_daemon = r.read_bool()?;
    let transfer_view = r.read_bool()?;
    let key = r.read_key()?;
    let merged_view_ids = r.read_view_id_array()?;
    let parameters = r.read_string("parameters", limits::PARAMETERS)?;
    let uptime = r.read_time()?;
    let members = r.read_string_array("member endpoint", limits::ENDPOINT)?;
    let addresses = r.read_string_array("member address", limits::ADDRESS)?;

    if nmembers == 0 {
        return Err(EnsembleError::Protocol("View has no members".to_string()));
    }
    if members.len() != nmembers || addresses.len() != nmembers {
        return Err(EnsembleError::Protocol(format!(
            "View lists {} endpoints and {} addresses for {} members",
            members.len(),
            addresses.len(),
            nmembers
        )));
    }
    if rank >= nmembers {
        return Err(EnsembleError::Protocol(format!(
            "Rank {} outside view of {} members",
            rank, nmembers
        )));
    }

    Ok(View {
        version,
        group,
        protocol,
        coordinator_rank,
        ltime,
        primary,
        uses_group_daemon,
        transfer_view,
        merged_view_ids,
        parameters,
        uptime,
        members,
        addresses,
        endpoint,
        address,
        rank,
        name,
        nmembers,
        view_id,
        am_coordinator,
        key,
    })
}

/// Encode a view body in the service's layout.
///
/// The client never sends views; this is for service simulators.
pub fn encode_view(w: &mut WireWriter, view: &View) -> Result<()> {
    w.write_string("endpoint", &view.endpoint, limits::ENDPOINT)?;
    w.write_string("address", &view.address, limits::ADDRESS)?;
    w.write_int32(view.rank as i32);
    w.write_string("name", &view.name, limits::NAME)?;
    w.write_int32(view.nmembers as i32);
    w.write_view_id(&view.view_id)?;
    w.write_bool(view.am_coordinator);

    w.write_string("version", &view.version, limits::VERSION)?;
    w.write_string("group", &view.group, limits::GROUP_NAME)?;
    w.write_string("protocol", &view.protocol, limits::PROTOCOL)?;
    w.write_int32(view.coordinator_rank as i32);
    w.write_int32(view.ltime);
    w.write_bool(view.primary);
    w.write_bool(view.uses_group_daemon);
    w.write_bool(view.transfer_view);
    w.write_key(view.key.as_ref())?;
    w.write_view_id_array(&view.merged_view_ids)?;
    w.write_string("parameters", &view.parameters, limits::PARAMETERS)?;
    w.write_time(view.uptime);
    w.write_string_array("member endpoint", &view.members, limits::ENDPOINT)?;
    w.write_string_array("member address", &view.addresses, limits::ADDRESS)?;
    Ok(())
}
