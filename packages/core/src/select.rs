//! Selection policy: picks exactly one partition as the storage root.
//!
//! Both execution modes share the same eligibility and heuristic rules; they
//! only differ in what happens when the rules leave more than one candidate:
//! interactive runs ask the operator, unattended runs abort.

use std::path::PathBuf;

use crate::classify::CandidateSet;
use crate::config::ExecutionMode;
use crate::disk::BlockDevice;
use crate::error::{Error, Result};
use crate::prompt::Prompter;

/// Why a candidate was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// It was the only candidate.
    Only,
    /// It was the only exFAT candidate among several.
    SingleExfat,
    /// The operator picked it.
    Operator,
}

/// Outcome of the selection policy, before a media root exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    /// Already mounted; its mount point becomes the media root.
    Mounted { device: BlockDevice, reason: Reason },
    /// Needs mounting before a media root exists.
    Unmounted { device: BlockDevice, reason: Reason },
}

impl Choice {
    pub fn device(&self) -> &BlockDevice {
        match self {
            Choice::Mounted { device, .. } | Choice::Unmounted { device, .. } => device,
        }
    }

    pub fn reason(&self) -> Reason {
        match self {
            Choice::Mounted { reason, .. } | Choice::Unmounted { reason, .. } => *reason,
        }
    }
}

/// The chosen partition together with its resolved media root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub device: BlockDevice,
    pub media_root: PathBuf,
}

/// Applies the selection policy.
///
/// When any candidate is already mounted, only mounted candidates are
/// considered; the unmounted ones are left alone.
pub fn choose(
    candidates: &CandidateSet,
    mode: ExecutionMode,
    prompter: &mut dyn Prompter,
) -> Result<Choice> {
    if !candidates.mounted.is_empty() {
        if !candidates.unmounted.is_empty() {
            log::info!(
                "preferring mounted partitions; ignoring {} unmounted candidate(s)",
                candidates.unmounted.len()
            );
        }
        let (index, reason) = pick(&candidates.mounted, "mounted", mode, prompter)?;
        return Ok(Choice::Mounted {
            device: candidates.mounted[index].clone(),
            reason,
        });
    }

    if !candidates.unmounted.is_empty() {
        let (index, reason) = pick(&candidates.unmounted, "unmounted", mode, prompter)?;
        return Ok(Choice::Unmounted {
            device: candidates.unmounted[index].clone(),
            reason,
        });
    }

    Err(Error::NoEligibleDevices)
}

/// Index of the exFAT candidate if exactly one exists.
pub fn unique_exfat(devices: &[BlockDevice]) -> Option<usize> {
    let mut exfat = devices
        .iter()
        .enumerate()
        .filter(|(_, d)| d.is_exfat())
        .map(|(i, _)| i);
    match (exfat.next(), exfat.next()) {
        (Some(index), None) => Some(index),
        _ => None,
    }
}

fn pick(
    devices: &[BlockDevice],
    set: &str,
    mode: ExecutionMode,
    prompter: &mut dyn Prompter,
) -> Result<(usize, Reason)> {
    if devices.len() == 1 {
        log::info!("single {} candidate: {}", set, devices[0].path.display());
        return Ok((0, Reason::Only));
    }

    if let Some(index) = unique_exfat(devices) {
        log::info!(
            "auto-selecting the only exFAT partition {}",
            devices[index].path.display()
        );
        return Ok((index, Reason::SingleExfat));
    }

    if mode.is_unattended() {
        return Err(Error::AmbiguousSelection {
            count: devices.len(),
            set: set.to_string(),
        });
    }

    prompter.show(&format!("Multiple {} partitions found:", set));
    for (i, device) in devices.iter().enumerate() {
        prompter.show(&format!("  [{}] {}", i + 1, device));
    }
    let answer = prompter.input(&format!("Select a partition [1-{}]", devices.len()))?;
    let index = parse_choice(&answer, devices.len())?;
    Ok((index, Reason::Operator))
}

/// Parses a 1-based choice into a 0-based index within `max`.
pub fn parse_choice(input: &str, max: usize) -> Result<usize> {
    let invalid = || Error::InvalidSelection {
        input: input.to_string(),
        max,
    };
    let number: usize = input.trim().parse().map_err(|_| invalid())?;
    if number == 0 || number > max {
        return Err(invalid());
    }
    Ok(number - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::TransportBus;
    use crate::prompt::ScriptedPrompter;

    fn device(name: &str, fstype: &str, mountpoint: Option<&str>) -> BlockDevice {
        BlockDevice {
            name: name.to_string(),
            path: PathBuf::from(format!("/dev/{}", name)),
            removable: true,
            transport: TransportBus::Usb,
            fstype: fstype.to_string(),
            label: None,
            uuid: None,
            mountpoint: mountpoint.map(PathBuf::from),
            size: 4096,
        }
    }

    fn unmounted(devices: Vec<BlockDevice>) -> CandidateSet {
        CandidateSet {
            mounted: Vec::new(),
            unmounted: devices,
        }
    }

    fn mounted(devices: Vec<BlockDevice>) -> CandidateSet {
        CandidateSet {
            mounted: devices,
            unmounted: Vec::new(),
        }
    }

    #[test]
    fn test_single_unmounted_selected_without_prompt() {
        for mode in [ExecutionMode::Interactive, ExecutionMode::Unattended] {
            let mut prompter = ScriptedPrompter::new();
            let choice = choose(&unmounted(vec![device("sda1", "ntfs", None)]), mode, &mut prompter)
                .unwrap();
            assert!(matches!(choice, Choice::Unmounted { .. }));
            assert_eq!(choice.reason(), Reason::Only);
            assert_eq!(prompter.questions_asked(), 0);
        }
    }

    #[test]
    fn test_single_mounted_selected_without_prompt() {
        let mut prompter = ScriptedPrompter::new();
        let set = mounted(vec![device("sda1", "ext4", Some("/media/pi/DATA"))]);
        let choice = choose(&set, ExecutionMode::Unattended, &mut prompter).unwrap();
        assert!(matches!(choice, Choice::Mounted { .. }));
        assert_eq!(choice.device().name, "sda1");
    }

    #[test]
    fn test_single_exfat_wins_in_both_modes() {
        let set = unmounted(vec![
            device("sda1", "ntfs", None),
            device("sdb1", "exfat", None),
            device("sdc1", "ext4", None),
        ]);
        for mode in [ExecutionMode::Interactive, ExecutionMode::Unattended] {
            let mut prompter = ScriptedPrompter::new();
            let choice = choose(&set, mode, &mut prompter).unwrap();
            assert_eq!(choice.device().name, "sdb1");
            assert_eq!(choice.reason(), Reason::SingleExfat);
            assert_eq!(prompter.questions_asked(), 0);
        }
    }

    #[test]
    fn test_single_exfat_among_mounted() {
        let set = mounted(vec![
            device("sda1", "exfat", Some("/media/a")),
            device("sdb1", "vfat", Some("/media/b")),
        ]);
        let choice = choose(&set, ExecutionMode::Unattended, &mut ScriptedPrompter::new()).unwrap();
        assert_eq!(choice.device().name, "sda1");
    }

    #[test]
    fn test_unattended_aborts_on_ambiguity() {
        let no_exfat = unmounted(vec![device("sda1", "ntfs", None), device("sdb1", "ext4", None)]);
        let two_exfat = mounted(vec![
            device("sda1", "exfat", Some("/media/a")),
            device("sdb1", "exfat", Some("/media/b")),
        ]);

        for set in [no_exfat, two_exfat] {
            let result = choose(&set, ExecutionMode::Unattended, &mut ScriptedPrompter::new());
            assert!(matches!(
                result,
                Err(Error::AmbiguousSelection { count: 2, .. })
            ));
        }
    }

    #[test]
    fn test_interactive_prompts_on_ambiguity() {
        let set = unmounted(vec![device("sda1", "ntfs", None), device("sdb1", "ext4", None)]);
        let mut prompter = ScriptedPrompter::new().with_input("2");

        let choice = choose(&set, ExecutionMode::Interactive, &mut prompter).unwrap();
        assert_eq!(choice.device().name, "sdb1");
        assert_eq!(choice.reason(), Reason::Operator);
        assert!(prompter.transcript.iter().any(|l| l.contains("[2] /dev/sdb1")));
    }

    #[test]
    fn test_interactive_rejects_out_of_range() {
        let set = unmounted(vec![device("sda1", "ntfs", None), device("sdb1", "ext4", None)]);
        for bad in ["0", "3", "abc", ""] {
            let mut prompter = ScriptedPrompter::new().with_input(bad);
            let result = choose(&set, ExecutionMode::Interactive, &mut prompter);
            assert!(matches!(result, Err(Error::InvalidSelection { max: 2, .. })));
        }
    }

    #[test]
    fn test_mounted_preferred_over_unmounted() {
        let set = CandidateSet {
            mounted: vec![device("sdb1", "ext4", Some("/media/b"))],
            unmounted: vec![device("sda1", "exfat", None)],
        };
        let choice = choose(&set, ExecutionMode::Unattended, &mut ScriptedPrompter::new()).unwrap();
        assert!(matches!(choice, Choice::Mounted { .. }));
        assert_eq!(choice.device().name, "sdb1");
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice(" 1 ", 3).unwrap(), 0);
        assert_eq!(parse_choice("3", 3).unwrap(), 2);
        assert!(parse_choice("4", 3).is_err());
        assert!(parse_choice("-1", 3).is_err());
    }
}
