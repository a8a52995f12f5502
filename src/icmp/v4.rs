use super::{EchoReply, SequenceNumber, Ttl};
use crate::error::{PingError, PingResult};
use pnet_packet::icmp::echo_reply::EchoReplyPacket;
use pnet_packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet_packet::icmp::{checksum, IcmpCode, IcmpPacket, IcmpTypes};
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::Packet;

/// Builds an ICMP echo request (type 8, code 0) with the RFC 1071
/// one's-complement checksum filled in.
pub(crate) fn encode(ident: u16, sequence: SequenceNumber, payload: &[u8]) -> PingResult<Vec<u8>> {
    let buf = vec![0u8; MutableEchoRequestPacket::minimum_packet_size() + payload.len()];
    let mut packet = MutableEchoRequestPacket::owned(buf)
        .ok_or_else(|| PingError::malformed("could not create ICMP echo request"))?;
    packet.set_icmp_type(IcmpTypes::EchoRequest);
    packet.set_icmp_code(IcmpCode::new(0));
    packet.set_identifier(ident);
    packet.set_sequence_number(sequence.into());
    packet.set_payload(payload);

    let sum = checksum(&IcmpPacket::new(packet.packet()).expect("buffer is above minimum size"));
    packet.set_checksum(sum);
    Ok(packet.packet().to_vec())
}

/// Parses an inbound datagram into an echo reply (type 0, code 0).
///
/// A raw IPv4 socket delivers the IP header in front of the ICMP message, so
/// it is stripped first; the header also carries the received TTL. Datagrams
/// that are already bare ICMP (as some delivery paths produce) pass through
/// untouched with an absent TTL.
pub(crate) fn decode(bytes: &[u8]) -> PingResult<EchoReply> {
    let (icmp_bytes, ttl) = strip_ip_header(bytes)?;

    let reply = EchoReplyPacket::new(icmp_bytes)
        .ok_or_else(|| PingError::malformed("datagram shorter than the ICMP header"))?;
    if reply.get_icmp_type() != IcmpTypes::EchoReply || reply.get_icmp_code() != IcmpCode::new(0) {
        return Err(PingError::malformed(format!(
            "not an echo reply: type {} code {}",
            reply.get_icmp_type().0,
            reply.get_icmp_code().0
        )));
    }

    let computed = checksum(&IcmpPacket::new(icmp_bytes).expect("length checked above"));
    if computed != reply.get_checksum() {
        return Err(PingError::malformed(format!(
            "checksum mismatch: got {:#06x}, computed {computed:#06x}",
            reply.get_checksum()
        )));
    }

    Ok(EchoReply {
        ident: reply.get_identifier(),
        sequence: reply.get_sequence_number().into(),
        payload: reply.payload().to_vec(),
        ttl,
    })
}

/// An ICMP echo message starts with type 0 or 8, never with a 0x4_ version
/// nibble, which is how the two framings are told apart.
fn strip_ip_header(bytes: &[u8]) -> PingResult<(&[u8], Option<Ttl>)> {
    if bytes.is_empty() {
        return Err(PingError::malformed("empty datagram"));
    }
    if bytes[0] >> 4 != 4 {
        return Ok((bytes, None));
    }

    let ip = Ipv4Packet::new(bytes)
        .ok_or_else(|| PingError::malformed("truncated IPv4 header"))?;
    let header_len = usize::from(ip.get_header_length()) * 4;
    if header_len < Ipv4Packet::minimum_packet_size() || bytes.len() < header_len {
        return Err(PingError::malformed("bad IPv4 header length"));
    }
    let ttl = Ttl(ip.get_ttl());
    Ok((&bytes[header_len..], Some(ttl)))
}


#[cfg(test)]
mod tests {
    use super::*;
    use pnet_packet::icmp::echo_request::EchoRequestPacket;

    #[test]
    fn encode_sets_header_fields_and_payload() {
        let bytes = encode(0xABCD, SequenceNumber(7), b"hello").unwrap();
        let packet = EchoRequestPacket::new(&bytes).unwrap();
        assert_eq!(IcmpTypes::EchoRequest, packet.get_icmp_type());
        assert_eq!(IcmpCode::new(0), packet.get_icmp_code());
        assert_eq!(0xABCD, packet.get_identifier());
        assert_eq!(7, packet.get_sequence_number());
        assert_eq!(b"hello", packet.payload());
    }

    #[test]
    fn reply_round_trip_recovers_all_fields() {
        let bytes = testing::echo_reply_bytes(0x1234, 42, b"payload-bytes");
        let reply = decode(&bytes).unwrap();
        assert_eq!(0x1234, reply.ident);
        assert_eq!(SequenceNumber(42), reply.sequence);
        assert_eq!(b"payload-bytes".to_vec(), reply.payload);
        assert_eq!(None, reply.ttl);
    }

    #[test]
    fn decode_strips_prepended_ip_header_and_reports_ttl() {
        let icmp = testing::echo_reply_bytes(0x1234, 3, b"abc");
        // Minimal 20-byte IPv4 header: version 4, IHL 5, TTL 57, proto ICMP.
        let mut datagram = vec![
            0x45, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 57, 0x01, 0x00, 0x00, 127, 0, 0, 1,
            127, 0, 0, 1,
        ];
        let total_len = (datagram.len() + icmp.len()) as u16;
        datagram[2..4].copy_from_slice(&total_len.to_be_bytes());
        datagram.extend_from_slice(&icmp);

        let reply = decode(&datagram).unwrap();
        assert_eq!(0x1234, reply.ident);
        assert_eq!(SequenceNumber(3), reply.sequence);
        assert_eq!(Some(Ttl(57)), reply.ttl);
    }

    #[test]
    fn single_bit_corruption_fails_checksum_verification() {
        let mut bytes = testing::echo_reply_bytes(0x1234, 42, b"payload-bytes");
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, PingError::MalformedPacket(_)), "{err}");
        assert!(format!("{err}").contains("checksum"));
    }

    #[test]
    fn echo_request_is_not_a_reply() {
        let bytes = encode(1, SequenceNumber(0), b"x").unwrap();
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, PingError::MalformedPacket(_)));
    }

    #[test]
    fn truncated_datagrams_are_malformed() {
        assert!(matches!(decode(&[]), Err(PingError::MalformedPacket(_))));
        assert!(matches!(decode(&[0x00, 0x00, 0x12]), Err(PingError::MalformedPacket(_))));
        // Claims a 20-byte IP header but ends early.
        assert!(matches!(decode(&[0x45, 0x00, 0x00]), Err(PingError::MalformedPacket(_))));
    }
}
