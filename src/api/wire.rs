//! Wire types for the back-office server's JSON API, plus the mapping
//! into domain models. The server speaks camelCase and keeps the
//! original Korean policy markers ("자동"/"수동", "O"/"X").

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{
    AttendancePolicy, AttendanceType, Entry, RolloverPolicy, Slot, ToggleAction, ToggleOutcome,
    SLOT_COUNT,
};

use super::error::ApiError;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSlot {
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub site: String,
    #[serde(default)]
    pub deposit_amount: i64,
    #[serde(default)]
    pub withdraw_amount: i64,
    #[serde(default)]
    pub attended: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEntry {
    pub id: String,
    pub account_id: i64,
    pub entry_date: String,
    pub display_order: i64,
    #[serde(default)]
    pub slots: Vec<WireSlot>,
    #[serde(default)]
    pub annotation: String,
    #[serde(default)]
    pub entered_amount: i64,
    #[serde(default)]
    pub total_amount: i64,
    #[serde(default)]
    pub rate_amount: i64,
    #[serde(default)]
    pub carried_amount: i64,
    #[serde(default)]
    pub private_amount: i64,
    #[serde(default)]
    pub total_charge: i64,
    #[serde(default)]
    pub margin: i64,
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePolicy {
    #[serde(default)]
    pub attendance_type: Option<String>,
    #[serde(default)]
    pub rollover: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireToggleOutcome {
    pub consecutive_days: u32,
    pub total_days: u32,
    pub action: String,
}

pub fn map_wire_entry(wire: WireEntry) -> Result<Entry, ApiError> {
    let entry_date = NaiveDate::parse_from_str(&wire.entry_date, DATE_FORMAT)
        .map_err(|e| ApiError::ParseError(format!("bad entry date {:?}: {}", wire.entry_date, e)))?;

    let mut slots: [Slot; SLOT_COUNT] = Default::default();
    for (i, wire_slot) in wire.slots.into_iter().take(SLOT_COUNT).enumerate() {
        slots[i] = Slot {
            identity: wire_slot.identity,
            site: wire_slot.site,
            deposit_amount: wire_slot.deposit_amount,
            withdraw_amount: wire_slot.withdraw_amount,
            attended: wire_slot.attended,
        };
    }

    Ok(Entry {
        id: wire.id,
        account_id: wire.account_id,
        entry_date,
        display_order: wire.display_order,
        slots,
        annotation: wire.annotation,
        entered_amount: wire.entered_amount,
        total_amount: wire.total_amount,
        rate_amount: wire.rate_amount,
        carried_amount: wire.carried_amount,
        private_amount: wire.private_amount,
        total_charge: wire.total_charge,
        margin: wire.margin,
        revision: wire.revision,
        created_at: wire.created_at,
        updated_at: wire.updated_at,
    })
}

pub fn map_entry_to_wire(entry: &Entry) -> WireEntry {
    WireEntry {
        id: entry.id.clone(),
        account_id: entry.account_id,
        entry_date: entry.entry_date.format(DATE_FORMAT).to_string(),
        display_order: entry.display_order,
        slots: entry
            .slots
            .iter()
            .map(|s| WireSlot {
                identity: s.identity.clone(),
                site: s.site.clone(),
                deposit_amount: s.deposit_amount,
                withdraw_amount: s.withdraw_amount,
                attended: s.attended,
            })
            .collect(),
        annotation: entry.annotation.clone(),
        entered_amount: entry.entered_amount,
        total_amount: entry.total_amount,
        rate_amount: entry.rate_amount,
        carried_amount: entry.carried_amount,
        private_amount: entry.private_amount,
        total_charge: entry.total_charge,
        margin: entry.margin,
        revision: entry.revision,
        created_at: entry.created_at,
        updated_at: entry.updated_at,
    }
}

/// Policy markers as stored server-side: attendance "자동"/"수동"
/// (default 자동), rollover "O"/"X" (default X).
pub fn map_wire_policy(wire: &WirePolicy) -> AttendancePolicy {
    let attendance_type = match wire.attendance_type.as_deref() {
        Some("수동") => AttendanceType::Manual,
        _ => AttendanceType::Automatic,
    };
    let rollover = match wire.rollover.as_deref() {
        Some("O") => RolloverPolicy::Included,
        _ => RolloverPolicy::Excluded,
    };
    AttendancePolicy {
        attendance_type,
        rollover,
    }
}

pub fn map_policy_to_wire(policy: AttendancePolicy) -> WirePolicy {
    WirePolicy {
        attendance_type: Some(
            match policy.attendance_type {
                AttendanceType::Automatic => "자동",
                AttendanceType::Manual => "수동",
            }
            .to_string(),
        ),
        rollover: Some(
            match policy.rollover {
                RolloverPolicy::Included => "O",
                RolloverPolicy::Excluded => "X",
            }
            .to_string(),
        ),
    }
}

pub fn map_wire_toggle(wire: WireToggleOutcome) -> Result<ToggleOutcome, ApiError> {
    let action = match wire.action.as_str() {
        "added" => ToggleAction::Added,
        "removed" => ToggleAction::Removed,
        "noop" => ToggleAction::Noop,
        other => {
            return Err(ApiError::ParseError(format!(
                "unknown toggle action {:?}",
                other
            )))
        }
    };
    Ok(ToggleOutcome {
        consecutive_days: wire.consecutive_days,
        total_days: wire.total_days,
        action,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_survives_wire_round_trip() {
        let mut entry = Entry::new_local(3, NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(), 2);
        entry.id = "105".to_string();
        entry.annotation = "바때기10충".to_string();
        entry.slots[1] = Slot {
            identity: "김철수".into(),
            site: "로로벳".into(),
            deposit_amount: 100_000,
            withdraw_amount: 30_000,
            attended: true,
        };
        entry.total_amount = 500_000;
        entry.revision = 4;

        let wire = map_entry_to_wire(&entry);
        let back = map_wire_entry(wire).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn short_slot_list_pads_with_blanks() {
        let wire = WireEntry {
            id: "7".into(),
            account_id: 1,
            entry_date: "2025-03-10".into(),
            display_order: 0,
            slots: vec![WireSlot {
                identity: "김철수".into(),
                site: "샷벳".into(),
                deposit_amount: 50_000,
                withdraw_amount: 0,
                attended: false,
            }],
            annotation: String::new(),
            entered_amount: 0,
            total_amount: 0,
            rate_amount: 0,
            carried_amount: 0,
            private_amount: 0,
            total_charge: 0,
            margin: 0,
            revision: 0,
            created_at: 0,
            updated_at: 0,
        };

        let entry = map_wire_entry(wire).unwrap();
        assert_eq!(entry.slots[0].site, "샷벳");
        assert!(entry.slots[1].is_blank());
        assert!(entry.slots[3].is_blank());
    }

    #[test]
    fn bad_date_is_a_parse_error() {
        let wire = WireEntry {
            id: "7".into(),
            account_id: 1,
            entry_date: "2025/03/10".into(),
            display_order: 0,
            slots: vec![],
            annotation: String::new(),
            entered_amount: 0,
            total_amount: 0,
            rate_amount: 0,
            carried_amount: 0,
            private_amount: 0,
            total_charge: 0,
            margin: 0,
            revision: 0,
            created_at: 0,
            updated_at: 0,
        };
        assert!(matches!(map_wire_entry(wire), Err(ApiError::ParseError(_))));
    }

    #[test]
    fn policy_markers_map_both_ways() {
        let wire = WirePolicy {
            attendance_type: Some("수동".into()),
            rollover: Some("O".into()),
        };
        let policy = map_wire_policy(&wire);
        assert_eq!(policy.attendance_type, AttendanceType::Manual);
        assert_eq!(policy.rollover, RolloverPolicy::Included);

        let back = map_policy_to_wire(policy);
        assert_eq!(back.attendance_type.as_deref(), Some("수동"));
        assert_eq!(back.rollover.as_deref(), Some("O"));
    }

    #[test]
    fn missing_policy_markers_fall_back_to_defaults() {
        let policy = map_wire_policy(&WirePolicy {
            attendance_type: None,
            rollover: None,
        });
        assert_eq!(policy.attendance_type, AttendanceType::Automatic);
        assert_eq!(policy.rollover, RolloverPolicy::Excluded);
    }

    #[test]
    fn unknown_toggle_action_is_rejected() {
        let wire = WireToggleOutcome {
            consecutive_days: 1,
            total_days: 1,
            action: "flipped".into(),
        };
        assert!(map_wire_toggle(wire).is_err());
    }
}
