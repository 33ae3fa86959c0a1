//! SOCKS5 address codec
//!
//! Encodes and decodes the three SOCKS5 address record forms (IPv4, domain
//! name, IPv6). The two-byte port that follows an address record is always
//! network byte order and is handled by the callers.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Encode a host into its SOCKS5 address record.
///
/// An IPv4 literal becomes `(0x01, 4 bytes)`, an IPv6 literal
/// `(0x04, 16 bytes)`, and anything else is sent as a length-prefixed
/// domain name, failing when it exceeds 255 bytes.
pub fn encode_host(host: &str) -> Result<(u8, Vec<u8>), Socks5Error> {
    if let Ok(v4) = host.parse::<Ipv4Addr>() {
        return Ok((SOCKS5_ADDR_TYPE_IPV4, v4.octets().to_vec()));
    }
    if let Ok(v6) = host.parse::<Ipv6Addr>() {
        return Ok((SOCKS5_ADDR_TYPE_IPV6, v6.octets().to_vec()));
    }

    let bytes = host.as_bytes();
    if bytes.len() > MAX_DOMAIN_LEN {
        return Err(Socks5Error::DomainTooLong(bytes.len()));
    }
    let mut record = Vec::with_capacity(bytes.len() + 1);
    record.push(bytes.len() as u8);
    record.extend_from_slice(bytes);
    Ok((SOCKS5_ADDR_TYPE_DOMAIN, record))
}

/// Read one address record of the given type from the stream.
///
/// IPv4 and IPv6 records are rendered as literals; domain names are
/// returned verbatim. Uses read-exact semantics throughout, so short reads
/// never truncate a field.
pub async fn read_addr<S>(stream: &mut S, addr_type: u8) -> io::Result<String>
where
    S: AsyncRead + Unpin,
{
    match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            Ok(Ipv4Addr::from(addr).to_string())
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            let mut len_buf = [0u8; 1];
            stream.read_exact(&mut len_buf).await?;
            let domain_len = len_buf[0] as usize;
            if domain_len == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "empty domain name",
                ));
            }

            let mut domain_buf = vec![0u8; domain_len];
            stream.read_exact(&mut domain_buf).await?;
            String::from_utf8(domain_buf).map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid domain name: {}", e),
                )
            })
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            Ok(Ipv6Addr::from(addr).to_string())
        }

        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unknown address type: {}", addr_type),
        )),
    }
}
