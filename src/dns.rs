use dns_lookup::lookup_host;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Resolve the destination to an IPv4 address plus its display string.
/// Literals take the fast path; hostnames go through the resolver on a
/// blocking worker.
pub async fn resolve_ipv4(input: &str) -> anyhow::Result<(Ipv4Addr, String)> {
    if let Ok(addr) = input.parse::<Ipv4Addr>() {
        return Ok((addr, addr.to_string()));
    }

    if input.parse::<Ipv6Addr>().is_ok() {
        return Err(anyhow::anyhow!("only IPv4 destinations are supported"));
    }

    let addresses = tokio::task::spawn_blocking({
        let input = input.to_string();
        move || lookup_host(&input)
    })
    .await??;

    let addr = addresses
        .into_iter()
        .find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| anyhow::anyhow!("no IPv4 addresses found for {}", input))?;

    Ok((addr, addr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ipv4_literal() {
        let (addr, display) = resolve_ipv4("8.8.8.8").await.unwrap();
        assert_eq!(addr, Ipv4Addr::new(8, 8, 8, 8));
        assert_eq!(display, "8.8.8.8");
    }

    #[tokio::test]
    async fn test_ipv6_literal_rejected() {
        assert!(resolve_ipv4("::1").await.is_err());
    }
}
