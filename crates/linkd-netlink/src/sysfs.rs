// # Sysfs Enumeration
//
// Reads the links present right now from `/sys/class/net`. Each interface
// directory carries `ifindex`, `flags` (hex), `operstate`, `carrier` and
// `dormant`.
//
// The `flags` file holds only the administrative flags. Lower-up and
// dormant come from the `carrier` and `dormant` files and are folded into
// the flags the way an RTM_NEWLINK message reports them.

use std::fmt::Display;
use std::io;
use std::path::Path;
use tracing::debug;

use crate::kernel::{IFF_DORMANT, IFF_LOWER_UP, KernelLink, OperStatus};

/// Default sysfs network class directory
pub const SYSFS_NET: &str = "/sys/class/net";

/// Read every interface below `root`, ordered by index
///
/// Interfaces that vanish or cannot be parsed mid-scan are skipped.
pub async fn read_links(root: &Path) -> io::Result<Vec<KernelLink>> {
    let mut entries = tokio::fs::read_dir(root).await?;
    let mut links = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        match read_link(&entry.path(), &name).await {
            Ok(link) => links.push(link),
            Err(e) => debug!("Skipping interface {}: {}", name, e),
        }
    }

    links.sort_by_key(|link| link.index);
    Ok(links)
}

async fn read_link(dir: &Path, name: &str) -> io::Result<KernelLink> {
    let index = read_attr(dir, "ifindex")
        .await?
        .parse::<u32>()
        .map_err(invalid_data)?;
    let mut flags = parse_flags(&read_attr(dir, "flags").await?)?;

    // Both read as EINVAL while the link is down
    if read_bool_attr(dir, "carrier").await {
        flags |= IFF_LOWER_UP;
    }
    if read_bool_attr(dir, "dormant").await {
        flags |= IFF_DORMANT;
    }

    // Some virtual devices lack operstate
    let oper = match read_attr(dir, "operstate").await {
        Ok(value) => OperStatus::from_sysfs(&value),
        Err(_) => OperStatus::Unknown,
    };

    Ok(KernelLink {
        index,
        name: name.to_string(),
        flags,
        oper,
    })
}

async fn read_attr(dir: &Path, attr: &str) -> io::Result<String> {
    let value = tokio::fs::read_to_string(dir.join(attr)).await?;
    Ok(value.trim().to_string())
}

async fn read_bool_attr(dir: &Path, attr: &str) -> bool {
    matches!(read_attr(dir, attr).await.as_deref(), Ok("1"))
}

fn parse_flags(value: &str) -> io::Result<u32> {
    let hex = value.trim_start_matches("0x");
    u32::from_str_radix(hex, 16).map_err(invalid_data)
}

fn invalid_data<E: Display>(err: E) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::IFF_UP;
    use linkd_core::link::CarrierState;
    use std::fs;

    fn write_link(root: &Path, name: &str, attrs: &[(&str, &str)]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for (attr, value) in attrs {
            fs::write(dir.join(attr), format!("{}\n", value)).unwrap();
        }
    }

    #[test]
    fn flags_are_hex() {
        assert_eq!(parse_flags("0x1003").unwrap(), 0x1003);
        assert_eq!(parse_flags("11043").unwrap(), 0x11043);
        assert!(parse_flags("up").is_err());
    }

    #[tokio::test]
    async fn reads_interfaces_in_index_order() {
        let root = tempfile::tempdir().unwrap();
        write_link(
            root.path(),
            "eth0",
            &[("ifindex", "2"), ("flags", "0x1003"), ("operstate", "up"), ("carrier", "1")],
        );
        write_link(
            root.path(),
            "lo",
            &[("ifindex", "1"), ("flags", "0x9"), ("operstate", "unknown"), ("carrier", "1")],
        );
        // No ifindex: skipped
        write_link(root.path(), "bonding_masters", &[]);
        // No operstate: unknown
        write_link(root.path(), "dummy0", &[("ifindex", "5"), ("flags", "0x1")]);

        let links = read_links(root.path()).await.unwrap();

        let names: Vec<_> = links.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["lo", "eth0", "dummy0"]);
        assert_eq!(links[1].flags & (IFF_UP | IFF_LOWER_UP), IFF_UP | IFF_LOWER_UP);
        assert_eq!(links[1].oper, OperStatus::Up);
        assert_eq!(links[2].oper, OperStatus::Unknown);
    }

    #[tokio::test]
    async fn carrier_and_dormant_files_drive_carrier_state() {
        let root = tempfile::tempdir().unwrap();
        // Loopback reports no operstate, only the carrier file
        write_link(
            root.path(),
            "lo",
            &[("ifindex", "1"), ("flags", "0x9"), ("operstate", "unknown"), ("carrier", "1")],
        );
        write_link(
            root.path(),
            "wlan0",
            &[
                ("ifindex", "3"),
                ("flags", "0x1003"),
                ("operstate", "unknown"),
                ("carrier", "1"),
                ("dormant", "1"),
            ],
        );
        // Carrier file unreadable while the link is down
        write_link(
            root.path(),
            "eth1",
            &[("ifindex", "4"), ("flags", "0x1002"), ("operstate", "down")],
        );

        let links = read_links(root.path()).await.unwrap();
        let carriers: Vec<_> = links
            .iter()
            .map(|l| l.to_link_info().unwrap().carrier)
            .collect();

        assert_eq!(
            carriers,
            vec![
                Some(CarrierState::Carrier),
                Some(CarrierState::Dormant),
                Some(CarrierState::Off),
            ]
        );
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        assert!(read_links(&root.path().join("absent")).await.is_err());
    }
}
