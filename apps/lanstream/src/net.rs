use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// IPv4 address other devices on the LAN can most likely reach us at: the
/// source address the OS would pick for outbound traffic. Connecting a UDP
/// socket sends nothing on the wire.
pub fn primary_lan_address() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// URLs to print at startup for reaching the web client.
pub fn access_urls(bound: SocketAddr, lan: Option<Ipv4Addr>) -> Vec<String> {
    let port = bound.port();
    let mut urls = vec![format!("http://localhost:{port}")];
    match bound.ip() {
        ip if ip.is_unspecified() => {
            if let Some(lan) = lan {
                urls.push(format!("http://{lan}:{port}"));
            }
        }
        ip if !ip.is_loopback() => urls.push(format!("http://{bound}")),
        _ => {}
    }
    urls
}
