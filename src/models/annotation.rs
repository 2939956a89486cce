use serde::{Deserialize, Serialize};

/// Closed set of point-type keywords a site adjustment may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointType {
    Attendance,
    Payback,
    Settlement,
    Rate,
    Referral,
    FirstDeposit,
    Redeposit,
    DepositBonus,
}

impl PointType {
    pub const ALL: [PointType; 8] = [
        PointType::Attendance,
        PointType::Payback,
        PointType::Settlement,
        PointType::Rate,
        PointType::Referral,
        PointType::FirstDeposit,
        PointType::Redeposit,
        PointType::DepositBonus,
    ];

    /// The keyword as it appears in annotation text.
    pub fn keyword(&self) -> &'static str {
        match self {
            PointType::Attendance => "출석",
            PointType::Payback => "페이백",
            PointType::Settlement => "정착",
            PointType::Rate => "요율",
            PointType::Referral => "지추",
            PointType::FirstDeposit => "첫충",
            PointType::Redeposit => "매충",
            PointType::DepositBonus => "입플",
        }
    }

    pub fn from_keyword(word: &str) -> Option<PointType> {
        Self::ALL.into_iter().find(|p| p.keyword() == word)
    }
}

/// Kind of chip-loss adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipKind {
    Mistake,
    Baegeo,
    Chipting,
}

impl ChipKind {
    pub const ALL: [ChipKind; 3] = [ChipKind::Mistake, ChipKind::Baegeo, ChipKind::Chipting];

    pub fn keyword(&self) -> &'static str {
        match self {
            ChipKind::Mistake => "칩실수",
            ChipKind::Baegeo => "배거",
            ChipKind::Chipting => "칩팅",
        }
    }

    pub fn from_keyword(word: &str) -> Option<ChipKind> {
        Self::ALL.into_iter().find(|c| c.keyword() == word)
    }
}

/// Whether the chip adjustment was recovered (먹) or lost (못먹).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipOutcome {
    Won,
    Lost,
}

impl ChipOutcome {
    pub fn keyword(&self) -> &'static str {
        match self {
            ChipOutcome::Won => "먹",
            ChipOutcome::Lost => "못먹",
        }
    }
}

/// Direction of a side-ledger cash movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideDirection {
    Charge,
    Withdraw,
}

impl SideDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SideDirection::Charge => "충",
            SideDirection::Withdraw => "환",
        }
    }
}

/// Point adjustment attached to a named site. Amount in base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitePointAdjustment {
    pub site: String,
    pub point_type: Option<PointType>,
    pub amount: i64,
}

/// Chip adjustment attached to a named site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteChipAdjustment {
    pub site: String,
    pub kind: ChipKind,
    pub amount: i64,
    pub outcome: ChipOutcome,
}

/// Site-independent side-ledger cash movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideLedgerEntry {
    pub amount: i64,
    pub direction: SideDirection,
}

/// Side-ledger chip adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideLedgerChip {
    pub kind: ChipKind,
    pub amount: i64,
    pub outcome: ChipOutcome,
}

/// Decoded form of an entry's free-text annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredAnnotation {
    pub site_points: Vec<SitePointAdjustment>,
    pub site_chips: Vec<SiteChipAdjustment>,
    pub side_entries: Vec<SideLedgerEntry>,
    pub side_chips: Vec<SideLedgerChip>,
    pub manual_notes: Vec<String>,
}

impl StructuredAnnotation {
    pub fn is_empty(&self) -> bool {
        self.site_points.is_empty()
            && self.site_chips.is_empty()
            && self.side_entries.is_empty()
            && self.side_chips.is_empty()
            && self.manual_notes.is_empty()
    }
}

/// Charge/withdraw totals the cascade consumes, in base units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideTotals {
    pub charge: i64,
    pub withdraw: i64,
}
