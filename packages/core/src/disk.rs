//! Block device discovery using lsblk.
//!
//! Output of `lsblk --json` is parsed into typed [`BlockDevice`] records at
//! this boundary; nothing downstream looks at raw command output.
//!
//! Some boards report `rm = 0` for USB sticks, so the transport of the parent
//! disk is carried along as a second removability signal.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, IoResultExt, Result};

/// Filesystem types that never hold user data.
const NON_DATA_FSTYPES: [&str; 4] = ["swap", "crypto_LUKS", "LVM2_member", "linux_raid_member"];

/// Filesystem types without native permission bits.
const FAT_FAMILY: [&str; 6] = ["vfat", "fat", "fat16", "fat32", "msdos", "exfat"];

/// Physical interconnect a device is attached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportBus {
    Usb,
    Other,
    #[default]
    Unknown,
}

impl TransportBus {
    fn from_lsblk(tran: Option<&str>) -> Self {
        match tran {
            Some("usb") => TransportBus::Usb,
            Some(t) if !t.is_empty() => TransportBus::Other,
            _ => TransportBus::Unknown,
        }
    }
}

/// Returns true if `fstype` belongs to the FAT family (including exFAT).
pub fn is_fat_family(fstype: &str) -> bool {
    FAT_FAMILY.contains(&fstype.to_ascii_lowercase().as_str())
}

/// Represents a block device (partition) on the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    /// Device name (e.g., "sda1", "mmcblk0p2").
    pub name: String,
    /// Full device path (e.g., "/dev/sda1").
    pub path: PathBuf,
    /// Kernel removable hint. Unreliable on some boards.
    pub removable: bool,
    /// Transport of the disk this partition lives on.
    pub transport: TransportBus,
    /// Filesystem type; empty when the partition carries none.
    pub fstype: String,
    /// Volume label, if set.
    pub label: Option<String>,
    /// Filesystem UUID as reported by lsblk.
    pub uuid: Option<String>,
    /// Current mount point, if mounted.
    pub mountpoint: Option<PathBuf>,
    /// Size in bytes.
    pub size: u64,
}

impl BlockDevice {
    /// Returns true if the partition carries a filesystem that can hold data.
    pub fn has_filesystem(&self) -> bool {
        !self.fstype.is_empty() && !NON_DATA_FSTYPES.contains(&self.fstype.as_str())
    }

    /// Returns true if the device is removable or hangs off a USB disk.
    pub fn is_external(&self) -> bool {
        self.removable || self.transport == TransportBus::Usb
    }

    /// Returns true if this device may serve as the storage root.
    pub fn is_eligible(&self) -> bool {
        self.has_filesystem() && self.is_external()
    }

    /// Returns true if this device is an exFAT partition.
    pub fn is_exfat(&self) -> bool {
        self.fstype.eq_ignore_ascii_case("exfat")
    }

    /// Returns true if mounting needs explicit ownership options.
    pub fn is_fat_family(&self) -> bool {
        is_fat_family(&self.fstype)
    }

    /// Returns true if this device is currently mounted.
    pub fn is_mounted(&self) -> bool {
        self.mountpoint.is_some()
    }
}

impl fmt::Display for BlockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}  {}  {}",
            self.path.display(),
            self.fstype,
            human_size(self.size)
        )?;
        if let Some(label) = self.label.as_ref().filter(|l| !l.is_empty()) {
            write!(f, "  \"{}\"", label)?;
        }
        if let Some(mountpoint) = &self.mountpoint {
            write!(f, "  mounted at {}", mountpoint.display())?;
        }
        Ok(())
    }
}

/// Formats a byte count with a binary unit, e.g. `14.9G`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "K", "M", "G", "T", "P"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}B", bytes)
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}

/// Raw JSON structure from lsblk output.
#[derive(Debug, Deserialize)]
struct LsblkOutput {
    blockdevices: Vec<LsblkDevice>,
}

#[derive(Debug, Deserialize)]
struct LsblkDevice {
    name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    rm: bool,
    #[serde(default)]
    tran: Option<String>,
    #[serde(default)]
    fstype: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(rename = "type")]
    device_type: Option<String>,
    #[serde(default)]
    children: Option<Vec<LsblkDevice>>,
}

/// lsblk prints `rm` as a boolean, a number or a string depending on version.
fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Number(n)) => n != 0,
        Some(Flag::Text(s)) => matches!(s.trim(), "1" | "true"),
        None => false,
    })
}

/// Lists all partitions on the system.
///
/// Calls `lsblk --json --bytes` and parses the output.
pub fn list_block_devices() -> Result<Vec<BlockDevice>> {
    let output = Command::new("lsblk")
        .args([
            "--json",
            "--bytes",
            "--output",
            "NAME,PATH,RM,TRAN,FSTYPE,LABEL,UUID,MOUNTPOINT,SIZE,TYPE",
        ])
        .output()
        .command_context("lsblk")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        return Err(Error::CommandExit {
            command: "lsblk".to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr,
        });
    }

    parse_lsblk_json(&String::from_utf8_lossy(&output.stdout))
}

/// Parses `lsblk --json` output into partitions.
pub fn parse_lsblk_json(json: &str) -> Result<Vec<BlockDevice>> {
    let lsblk_output: LsblkOutput = serde_json::from_str(json).map_err(|e| Error::LsblkParse {
        message: e.to_string(),
    })?;

    let usb_parents = usb_parent_names(&lsblk_output.blockdevices);
    let mut devices = Vec::new();
    collect_devices(&lsblk_output.blockdevices, None, &usb_parents, &mut devices);

    log::debug!(
        "discovered {} partitions ({} usb disks)",
        devices.len(),
        usb_parents.len()
    );
    Ok(devices)
}

/// Names of top-level disks attached over USB.
fn usb_parent_names(disks: &[LsblkDevice]) -> HashSet<String> {
    disks
        .iter()
        .filter(|d| d.tran.as_deref() == Some("usb"))
        .map(|d| d.name.clone())
        .collect()
}

/// Recursively collect partitions, inheriting the disk's transport.
fn collect_devices(
    lsblk_devices: &[LsblkDevice],
    parent_tran: Option<&str>,
    usb_parents: &HashSet<String>,
    devices: &mut Vec<BlockDevice>,
) {
    for dev in lsblk_devices {
        let tran = dev.tran.as_deref().or(parent_tran);
        let device_type = dev.device_type.as_deref();
        let fstype = dev.fstype.clone().unwrap_or_default();

        // Partitions, plus whole disks formatted without a partition table.
        let is_partition = device_type == Some("part");
        let is_bare_disk = device_type == Some("disk") && !fstype.is_empty();

        if is_partition || is_bare_disk {
            let on_usb_parent = usb_parents.iter().any(|p| dev.name.starts_with(p.as_str()));
            let transport = if on_usb_parent {
                TransportBus::Usb
            } else {
                TransportBus::from_lsblk(tran)
            };

            devices.push(BlockDevice {
                name: dev.name.clone(),
                path: dev
                    .path
                    .clone()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(format!("/dev/{}", dev.name))),
                removable: dev.rm,
                transport,
                fstype,
                label: dev.label.clone().filter(|l| !l.is_empty()),
                uuid: dev.uuid.clone().filter(|u| !u.is_empty()),
                mountpoint: dev
                    .mountpoint
                    .as_deref()
                    .filter(|m| !m.is_empty())
                    .map(PathBuf::from),
                size: dev.size.unwrap_or(0),
            });
        }

        if let Some(children) = &dev.children {
            collect_devices(children, tran, usb_parents, devices);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A Pi with its SD card, a USB stick whose `rm` flag is wrong, and a
    /// card reader that does report removable.
    const SAMPLE_LSBLK_JSON: &str = r#"{
        "blockdevices": [
            {
                "name": "mmcblk0", "path": "/dev/mmcblk0", "rm": false, "tran": null,
                "fstype": null, "label": null, "uuid": null, "mountpoint": null,
                "size": 31914983424, "type": "disk",
                "children": [
                    {
                        "name": "mmcblk0p1", "path": "/dev/mmcblk0p1", "rm": false, "tran": null,
                        "fstype": "vfat", "label": "bootfs", "uuid": "9E6D-2E4B",
                        "mountpoint": "/boot/firmware", "size": 536870912, "type": "part"
                    },
                    {
                        "name": "mmcblk0p2", "path": "/dev/mmcblk0p2", "rm": false, "tran": null,
                        "fstype": "ext4", "label": "rootfs", "uuid": "3b6a-root",
                        "mountpoint": "/", "size": 31373918208, "type": "part"
                    }
                ]
            },
            {
                "name": "sda", "path": "/dev/sda", "rm": false, "tran": "usb",
                "fstype": null, "label": null, "uuid": null, "mountpoint": null,
                "size": 128043712512, "type": "disk",
                "children": [
                    {
                        "name": "sda1", "path": "/dev/sda1", "rm": false, "tran": null,
                        "fstype": "exfat", "label": "HUB", "uuid": "64A1-F00D",
                        "mountpoint": null, "size": 128042663936, "type": "part"
                    }
                ]
            },
            {
                "name": "sdb", "path": "/dev/sdb", "rm": "1", "tran": "",
                "fstype": null, "label": null, "uuid": null, "mountpoint": null,
                "size": 8053063680, "type": "disk",
                "children": [
                    {
                        "name": "sdb1", "path": "/dev/sdb1", "rm": "1", "tran": "",
                        "fstype": "ntfs", "label": "", "uuid": "0ACE",
                        "mountpoint": null, "size": 8052015104, "type": "part"
                    },
                    {
                        "name": "sdb2", "path": "/dev/sdb2", "rm": "1", "tran": "",
                        "fstype": null, "label": null, "uuid": null,
                        "mountpoint": null, "size": 1048576, "type": "part"
                    }
                ]
            }
        ]
    }"#;

    fn parse_sample() -> Vec<BlockDevice> {
        parse_lsblk_json(SAMPLE_LSBLK_JSON).unwrap()
    }

    fn find<'a>(devices: &'a [BlockDevice], name: &str) -> &'a BlockDevice {
        devices.iter().find(|d| d.name == name).unwrap()
    }

    #[test]
    fn test_parse_lsblk_json() {
        let devices = parse_sample();
        assert_eq!(devices.len(), 5);

        let root = find(&devices, "mmcblk0p2");
        assert_eq!(root.mountpoint, Some(PathBuf::from("/")));
        assert_eq!(root.fstype, "ext4");
        assert!(!root.is_eligible());

        let stick = find(&devices, "sda1");
        assert_eq!(stick.label, Some("HUB".to_string()));
        assert_eq!(stick.uuid, Some("64A1-F00D".to_string()));
        assert_eq!(stick.path, PathBuf::from("/dev/sda1"));
        assert!(stick.is_exfat());
    }

    #[test]
    fn test_usb_parent_marks_partition_external() {
        let devices = parse_sample();
        let stick = find(&devices, "sda1");
        assert!(!stick.removable);
        assert_eq!(stick.transport, TransportBus::Usb);
        assert!(stick.is_eligible());
    }

    #[test]
    fn test_removable_flag_as_string() {
        let devices = parse_sample();
        let reader = find(&devices, "sdb1");
        assert!(reader.removable);
        assert_eq!(reader.transport, TransportBus::Unknown);
        assert_eq!(reader.label, None);
        assert!(reader.is_eligible());

        // No filesystem, not eligible even though removable.
        assert!(!find(&devices, "sdb2").is_eligible());
    }

    #[test]
    fn test_removable_flag_as_number() {
        let json = r#"{"blockdevices": [
            {"name": "sdc", "rm": 1, "tran": "sata", "fstype": "ext4", "size": 1024, "type": "disk"}
        ]}"#;
        let devices = parse_lsblk_json(json).unwrap();
        assert_eq!(devices.len(), 1);
        assert!(devices[0].removable);
        assert_eq!(devices[0].transport, TransportBus::Other);
        assert_eq!(devices[0].path, PathBuf::from("/dev/sdc"));
    }

    #[test]
    fn test_swap_is_not_a_data_filesystem() {
        let json = r#"{"blockdevices": [
            {"name": "sda", "tran": "usb", "type": "disk", "children": [
                {"name": "sda1", "fstype": "swap", "type": "part"}
            ]}
        ]}"#;
        let devices = parse_lsblk_json(json).unwrap();
        assert!(!devices[0].has_filesystem());
        assert!(!devices[0].is_eligible());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            parse_lsblk_json("not json"),
            Err(Error::LsblkParse { .. })
        ));
    }

    #[test]
    fn test_fat_family() {
        assert!(is_fat_family("vfat"));
        assert!(is_fat_family("exfat"));
        assert!(is_fat_family("FAT32"));
        assert!(!is_fat_family("ntfs"));
        assert!(!is_fat_family("ext4"));
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512B");
        assert_eq!(human_size(1536), "1.5K");
        assert_eq!(human_size(31914983424), "29.7G");
    }
}
