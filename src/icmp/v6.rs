use super::{EchoReply, PseudoHeader, SequenceNumber};
use crate::error::{PingError, PingResult};
use pnet_packet::icmpv6::echo_reply::EchoReplyPacket;
use pnet_packet::icmpv6::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmpv6::{checksum, Icmpv6Code, Icmpv6Packet, Icmpv6Types};
use pnet_packet::Packet;

/// Builds an ICMPv6 echo request (type 128, code 0).
///
/// The ICMPv6 checksum covers a pseudo-header with the source and
/// destination addresses (RFC 4443 §2.3), so it can only be computed once
/// the transport knows both ends. When `pseudo` is absent the checksum is
/// left at zero and the kernel fills it in, which it always does for raw
/// `IPPROTO_ICMPV6` sockets.
pub(crate) fn encode(
    ident: u16,
    sequence: SequenceNumber,
    payload: &[u8],
    pseudo: Option<PseudoHeader>,
) -> PingResult<Vec<u8>> {
    let buf = vec![0u8; MutableEchoRequestPacket::minimum_packet_size() + payload.len()];
    let mut packet = MutableEchoRequestPacket::owned(buf)
        .ok_or_else(|| PingError::malformed("could not create ICMPv6 echo request"))?;
    packet.set_icmpv6_type(Icmpv6Types::EchoRequest);
    packet.set_icmpv6_code(Icmpv6Code::new(0));
    packet.set_identifier(ident);
    packet.set_sequence_number(sequence.into());
    packet.set_payload(payload);

    if let Some((source, destination)) = pseudo {
        let sum = checksum(
            &Icmpv6Packet::new(packet.packet()).expect("buffer is above minimum size"),
            &source,
            &destination,
        );
        packet.set_checksum(sum);
    }
    Ok(packet.packet().to_vec())
}

/// Parses an inbound datagram into an echo reply (type 129, code 0).
///
/// Raw ICMPv6 delivery hands over the bare ICMP message, there is no IP
/// header to strip and the hop limit has to come from socket control data.
/// The checksum is verified only when the pseudo-header addresses are
/// supplied; the kernel has already discarded invalid checksums on datagrams
/// it delivers to raw ICMPv6 sockets.
pub(crate) fn decode(bytes: &[u8], pseudo: Option<PseudoHeader>) -> PingResult<EchoReply> {
    let reply = EchoReplyPacket::new(bytes)
        .ok_or_else(|| PingError::malformed("datagram shorter than the ICMPv6 header"))?;
    if reply.get_icmpv6_type() != Icmpv6Types::EchoReply
        || reply.get_icmpv6_code() != Icmpv6Code::new(0)
    {
        return Err(PingError::malformed(format!(
            "not an echo reply: type {} code {}",
            reply.get_icmpv6_type().0,
            reply.get_icmpv6_code().0
        )));
    }

    if let Some((source, destination)) = pseudo {
        let computed = checksum(
            &Icmpv6Packet::new(bytes).expect("length checked above"),
            &source,
            &destination,
        );
        if computed != reply.get_checksum() {
            return Err(PingError::malformed(format!(
                "checksum mismatch: got {:#06x}, computed {computed:#06x}",
                reply.get_checksum()
            )));
        }
    }

    Ok(EchoReply {
        ident: reply.get_identifier(),
        sequence: reply.get_sequence_number().into(),
        payload: reply.payload().to_vec(),
        ttl: None,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use pnet_packet::icmpv6::echo_reply::MutableEchoReplyPacket;

    pub(crate) fn echo_reply_bytes(
        ident: u16,
        sequence: u16,
        payload: &[u8],
        pseudo: Option<PseudoHeader>,
    ) -> Vec<u8> {
        let buf = vec![0u8; MutableEchoReplyPacket::minimum_packet_size() + payload.len()];
        let mut packet = MutableEchoReplyPacket::owned(buf).unwrap();
        packet.set_icmpv6_type(Icmpv6Types::EchoReply);
        packet.set_icmpv6_code(Icmpv6Code::new(0));
        packet.set_identifier(ident);
        packet.set_sequence_number(sequence);
        packet.set_payload(payload);
        if let Some((source, destination)) = pseudo {
            let sum = checksum(
                &Icmpv6Packet::new(packet.packet()).unwrap(),
                &source,
                &destination,
            );
            packet.set_checksum(sum);
        }
        packet.packet().to_vec()
    }

    pub(crate) fn reply_to_request(request: &[u8]) -> Vec<u8> {
        let request =
            pnet_packet::icmpv6::echo_request::EchoRequestPacket::new(request).unwrap();
        echo_reply_bytes(
            request.get_identifier(),
            request.get_sequence_number(),
            request.payload(),
            None,
        )
    }
}
