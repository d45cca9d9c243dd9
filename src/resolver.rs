/*!
 * Local Address Resolution
 *
 * Picks the address this host should announce: the first non-loopback
 * IPv4 address, walking interfaces and their addresses in the order the
 * OS reports them. That order is not stable across platforms, so a host
 * with several qualifying addresses may announce different ones.
 */

use crate::error::{Error, Result};
use std::net::{IpAddr, Ipv4Addr};

/// Enumerate the host's interfaces and return the first usable IPv4 address
pub fn local_ipv4() -> Result<Ipv4Addr> {
    let ifaces = if_addrs::get_if_addrs().map_err(Error::InterfaceList)?;
    log::debug!("found {} interface addresses", ifaces.len());

    select_ipv4(ifaces.iter().map(|i| (i.name.as_str(), i.ip())))
}

/// First address that is not loopback and can be expressed as IPv4.
///
/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) count as IPv4.
pub fn select_ipv4<'a, I>(addrs: I) -> Result<Ipv4Addr>
where
    I: IntoIterator<Item = (&'a str, IpAddr)>,
{
    for (name, ip) in addrs {
        let v4 = match as_ipv4(ip) {
            Some(v4) => v4,
            None => continue,
        };
        if v4.is_loopback() {
            continue;
        }
        log::debug!("using {} from interface {}", v4, name);
        return Ok(v4);
    }
    Err(Error::NoAddressFound)
}

fn as_ipv4(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}
