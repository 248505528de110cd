//! Fstab parsing and registration module.
//!
//! The selected volume is registered in `/etc/fstab` at most once. Existing
//! lines are never rewritten or removed; a new line is appended only when no
//! entry for the same volume is present.

use std::path::{Path, PathBuf};

use crate::Error;
use crate::disk::BlockDevice;
use crate::error::Result;
use crate::guard::Identity;
use crate::host::Host;
use crate::mount::{mount_options_for, ownership_options};
use crate::select::Selection;

/// Default fstab path.
pub const FSTAB_PATH: &str = "/etc/fstab";

/// Boot must not stall when the device is missing.
pub const NOFAIL_OPTION: &str = "nofail";

pub trait IntoMountOptions {
    fn into(self) -> Vec<String>;
}

impl IntoMountOptions for &str {
    fn into(self) -> Vec<String> {
        self.split(',').map(|s| s.to_string()).collect()
    }
}

impl IntoMountOptions for String {
    fn into(self) -> Vec<String> {
        IntoMountOptions::into(&self as &str)
    }
}

impl IntoMountOptions for Vec<String> {
    fn into(self) -> Vec<String> {
        self
    }
}

/// Represents a single fstab entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FstabEntry {
    /// The device identifier (e.g., "UUID=xxx" or "/dev/sda1").
    pub fs_spec: String,
    /// Mount point path.
    pub mount_point: PathBuf,
    /// Filesystem type (e.g., "exfat", "ext4").
    pub vfs_type: String,
    /// Mount options.
    pub mount_options: Vec<String>,
    /// This field is used by dump(8) to determine which filesystems need to be dumped.
    pub dump: u8,
    /// This field is used by fsck(8) to determine the order in which filesystem checks are done at boot time.
    pub fsck_order: u16,
}

impl FstabEntry {
    /// Creates a new fstab entry.
    pub fn new(
        fs_spec: impl Into<String>,
        mount_point: impl Into<PathBuf>,
        fs_type: impl Into<String>,
        mount_options: impl IntoMountOptions,
        dump: u8,
        fsck_order: u16,
    ) -> Self {
        Self {
            fs_spec: fs_spec.into(),
            mount_point: mount_point.into(),
            vfs_type: fs_type.into(),
            mount_options: mount_options.into(),
            dump,
            fsck_order,
        }
    }

    /// Formats the entry as an fstab line.
    pub fn to_fstab_line(&self) -> String {
        format!(
            "{}  {}  {}  {}  {}  {}",
            self.fs_spec,
            escape_fstab_path(&self.mount_point.to_string_lossy()),
            self.vfs_type,
            self.mount_options.join(","),
            self.dump,
            self.fsck_order
        )
    }

    /// Parses a single fstab line into an entry.
    ///
    /// Returns None for comments, empty lines and lines with too few fields.
    /// The dump and pass fields are optional and default to 0.
    pub fn from_line(line: &str) -> Result<Option<Self>> {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if !(4..=6).contains(&parts.len()) {
            return Ok(None);
        }

        let mount_options: Vec<String> = parts[3].split(',').map(|s| s.to_string()).collect();
        let dump = match parts.get(4) {
            Some(field) => field.parse::<u8>().map_err(|e| Error::FstabParse {
                message: format!("failed to parse dump field of line {}: {}", line, e),
            })?,
            None => 0,
        };
        let fsck_order = match parts.get(5) {
            Some(field) => field.parse::<u16>().map_err(|e| Error::FstabParse {
                message: format!("failed to parse fsck_order of line {}: {}", line, e),
            })?,
            None => 0,
        };

        Ok(Some(Self {
            fs_spec: parts[0].to_string(),
            mount_point: PathBuf::from(unescape_fstab_path(parts[1])),
            vfs_type: parts[2].to_string(),
            mount_options,
            dump,
            fsck_order,
        }))
    }

    /// Returns the UUID if the source is `UUID=<id>`.
    pub fn uuid(&self) -> Option<&str> {
        self.fs_spec.strip_prefix("UUID=")
    }
}

/// Escapes special characters in fstab paths using octal sequences.
///
/// Handles space (\040), tab (\011), newline (\012), and backslash (\134).
fn escape_fstab_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            ' ' => encoded.push_str(r"\040"),
            '\t' => encoded.push_str(r"\011"),
            '\n' => encoded.push_str(r"\012"),
            '\\' => encoded.push_str(r"\134"),
            _ => encoded.push(c),
        }
    }
    encoded
}

/// Unescapes octal sequences in fstab paths.
fn unescape_fstab_path(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            let mut octal_digits = String::new();
            let mut clone_iter = chars.clone();
            for _ in 0..3 {
                match clone_iter.next() {
                    Some(digit) if digit.is_digit(8) => octal_digits.push(digit),
                    _ => break,
                }
            }

            if octal_digits.len() == 3
                && let Ok(byte) = u8::from_str_radix(&octal_digits, 8)
            {
                result.push(byte as char);
                for _ in 0..3 {
                    chars.next();
                }
                continue;
            }
        }
        result.push(c);
    }
    result
}

/// Parses every entry of an fstab file's content.
///
/// Malformed lines belong to someone else; they are skipped with a warning
/// rather than failing the run.
pub fn parse_entries(content: &str) -> Vec<FstabEntry> {
    content
        .lines()
        .filter_map(|line| match FstabEntry::from_line(line) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("ignoring unparsable fstab line: {}", e);
                None
            }
        })
        .collect()
}

/// The identifier written into the entry: `UUID=<id>` when a durable volume
/// identifier is known, the device path otherwise.
pub fn source_spec(volume_id: Option<&str>, device_path: &Path) -> String {
    match volume_id {
        Some(id) => format!("UUID={}", id),
        None => device_path.to_string_lossy().to_string(),
    }
}

/// Mount options for the persisted entry.
pub fn entry_options(fstype: &str, identity: &Identity, device_timeout_secs: u32) -> Vec<String> {
    let mut opts = vec![
        "defaults".to_string(),
        NOFAIL_OPTION.to_string(),
        format!("x-systemd.device-timeout={}s", device_timeout_secs),
    ];
    if crate::disk::is_fat_family(fstype) {
        opts.push(ownership_options(identity.uid, identity.gid));
    }
    opts
}

/// Builds the entry for `selection`.
pub fn build_entry(
    selection: &Selection,
    volume_id: Option<&str>,
    identity: &Identity,
    device_timeout_secs: u32,
) -> FstabEntry {
    let device = &selection.device;
    FstabEntry::new(
        source_spec(volume_id, &device.path),
        selection.media_root.clone(),
        device.fstype.clone(),
        entry_options(&device.fstype, identity, device_timeout_secs),
        0,
        0,
    )
}

/// Returns true if `existing` registers the volume described by `wanted`.
///
/// UUID entries match on the identifier alone; device-path entries match only
/// when both device and target agree.
fn same_volume(existing: &FstabEntry, wanted: &FstabEntry) -> bool {
    match wanted.uuid() {
        Some(uuid) => existing.uuid() == Some(uuid),
        None => existing.fs_spec == wanted.fs_spec && existing.mount_point == wanted.mount_point,
    }
}

/// Finds an entry that already registers the same volume.
pub fn find_existing<'a>(entries: &'a [FstabEntry], wanted: &FstabEntry) -> Option<&'a FstabEntry> {
    entries.iter().find(|existing| same_volume(existing, wanted))
}

/// Finds an entry that mounts a different volume on the wanted target.
///
/// systemd refuses duplicate mount points, so such an entry would shadow ours.
pub fn find_conflict<'a>(entries: &'a [FstabEntry], wanted: &FstabEntry) -> Option<&'a FstabEntry> {
    entries.iter().find(|existing| {
        existing.mount_point == wanted.mount_point && !same_volume(existing, wanted)
    })
}

fn conflict_error(entry: &FstabEntry) -> Error {
    Error::TargetConflict {
        path: entry.mount_point.clone(),
        fs_spec: entry.fs_spec.clone(),
    }
}

/// Fails with [`Error::TargetConflict`] when `target` is already registered
/// for another volume. Read-only; runs before anything is mounted.
pub fn check_target(
    host: &dyn Host,
    fstab_path: &Path,
    device: &BlockDevice,
    target: &Path,
) -> Result<()> {
    let volume_id = resolve_volume_id(host, device);
    let wanted = FstabEntry::new(
        source_spec(volume_id.as_deref(), &device.path),
        target,
        device.fstype.clone(),
        Vec::<String>::new(),
        0,
        0,
    );

    let entries = parse_entries(&host.read_fstab(fstab_path)?);
    match find_conflict(&entries, &wanted) {
        Some(conflict) => Err(conflict_error(conflict)),
        None => Ok(()),
    }
}

/// Result of the best-effort remount check after appending an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Unmount and remount through the new entry succeeded.
    Verified,
    /// The check failed; the entry stays and should work after a reboot.
    Failed(String),
}

/// What the persistence step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// A line was appended and then exercised.
    Appended {
        entry: FstabEntry,
        verification: Verification,
    },
    /// An entry for this volume was already present; nothing was written.
    AlreadyPresent { entry: FstabEntry },
}

impl Registration {
    pub fn entry(&self) -> &FstabEntry {
        match self {
            Registration::Appended { entry, .. } | Registration::AlreadyPresent { entry } => entry,
        }
    }
}

/// Resolves the durable identifier of `device`.
///
/// Prefers a fresh `blkid` lookup, then the UUID lsblk reported.
pub fn resolve_volume_id(host: &dyn Host, device: &BlockDevice) -> Option<String> {
    host.volume_uuid(&device.path).or_else(|| device.uuid.clone())
}

/// Idempotently registers `selection` in the mount table at `fstab_path`.
pub fn register(
    host: &dyn Host,
    fstab_path: &Path,
    selection: &Selection,
    identity: &Identity,
    device_timeout_secs: u32,
) -> Result<Registration> {
    let volume_id = resolve_volume_id(host, &selection.device);
    if volume_id.is_none() {
        log::warn!(
            "no filesystem UUID for {}; falling back to the device path",
            selection.device.path.display()
        );
    }
    let entry = build_entry(selection, volume_id.as_deref(), identity, device_timeout_secs);

    let content = host.read_fstab(fstab_path)?;
    let entries = parse_entries(&content);

    if let Some(existing) = find_existing(&entries, &entry) {
        if existing.mount_point != selection.media_root {
            log::warn!(
                "{} is registered at {}, not at {}; the service will not find it there after a reboot",
                existing.fs_spec,
                existing.mount_point.display(),
                selection.media_root.display()
            );
        } else {
            log::info!(
                "{} already registered at {}; leaving fstab untouched",
                existing.fs_spec,
                existing.mount_point.display()
            );
        }
        return Ok(Registration::AlreadyPresent {
            entry: existing.clone(),
        });
    }

    if let Some(conflict) = find_conflict(&entries, &entry) {
        return Err(conflict_error(conflict));
    }

    let mut text = String::new();
    if !content.is_empty() && !content.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(&entry.to_fstab_line());
    text.push('\n');

    log::info!("appending to {}: {}", fstab_path.display(), entry.to_fstab_line());
    host.append_fstab(fstab_path, &text)?;

    let restore_options = mount_options_for(&selection.device, identity);
    let verification = verify(
        host,
        &entry.mount_point,
        &selection.device.path,
        restore_options.as_deref(),
    );
    Ok(Registration::Appended {
        entry,
        verification,
    })
}

/// Exercises a freshly appended entry by remounting through it.
///
/// Never fails the run. If the remount fails after the unmount succeeded,
/// `device` is mounted back on `target` with `restore_options`.
pub fn verify(
    host: &dyn Host,
    target: &Path,
    device: &Path,
    restore_options: Option<&str>,
) -> Verification {
    let result = host
        .systemctl(&["daemon-reload"])
        .and_then(|_| host.unmount(target))
        .and_then(|_| {
            host.mount_from_fstab(target).inspect_err(|_| {
                if let Err(e) = host.mount(device, target, restore_options) {
                    log::warn!(
                        "could not remount {} on {}: {}",
                        device.display(),
                        target.display(),
                        e
                    );
                }
            })
        });

    match result {
        Ok(()) => {
            log::info!("fstab entry for {} verified by remount", target.display());
            Verification::Verified
        }
        Err(e) => {
            log::warn!(
                "could not verify fstab entry for {} ({}); it will apply on next boot",
                target.display(),
                e
            );
            Verification::Failed(e.to_string())
        }
    }
}
