//! # Domain Types
//!
//! Core domain types for household inventory.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  InventoryItem  │   │    Quantity     │   │    DateInfo     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (opaque)    │──►│  value (≥ 0)    │   │  kind           │       │
//! │  │  household_id   │   │  unit           │   │  raw_text       │       │
//! │  │  product        │   └─────────────────┘   │  confidence     │       │
//! │  │  status         │                         │  resolved       │       │
//! │  │  expiry/opened ─┼────────────────────────►└─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ StorageLocation │   │   ItemStatus    │   │      Unit       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  Active         │   │  Piece, Pack    │       │
//! │  │  household_id   │   │  Consumed       │   │  Gram, Kilogram │       │
//! │  │  name, is_cold  │   │  Discarded      │   │  Milliliter,    │       │
//! │  └─────────────────┘   │  Archived       │   │  Liter          │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Batch Identity
//! One `InventoryItem` is one physical batch. Its `id` never changes; two
//! observations of the same batch lineage are detected through the merge
//! key (see [`crate::merge`]), not through the id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::validation;

/// Quantities at or below this value count as empty.
pub const QUANTITY_EPSILON: f64 = 1e-9;

// =============================================================================
// Unit
// =============================================================================

/// Measurement unit of a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Piece,
    Pack,
    Gram,
    Kilogram,
    Milliliter,
    Liter,
}

/// Units convert only within a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Count,
    Pack,
    Mass,
    Volume,
}

impl Unit {
    /// The dimension this unit measures.
    pub const fn dimension(&self) -> Dimension {
        match self {
            Unit::Piece => Dimension::Count,
            Unit::Pack => Dimension::Pack,
            Unit::Gram | Unit::Kilogram => Dimension::Mass,
            Unit::Milliliter | Unit::Liter => Dimension::Volume,
        }
    }

    /// Multiplier to the dimension's base unit (g, ml, piece, pack).
    const fn base_factor(&self) -> f64 {
        match self {
            Unit::Kilogram | Unit::Liter => 1000.0,
            _ => 1.0,
        }
    }

    /// Returns true if quantities in `self` and `other` can be combined.
    pub fn is_compatible_with(&self, other: Unit) -> bool {
        self.dimension() == other.dimension()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Unit::Piece => "piece",
            Unit::Pack => "pack",
            Unit::Gram => "g",
            Unit::Kilogram => "kg",
            Unit::Milliliter => "ml",
            Unit::Liter => "l",
        };
        write!(f, "{}", symbol)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// A non-negative amount in a unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    /// Creates a quantity, rejecting negative or non-finite values.
    pub fn new(value: f64, unit: Unit) -> CoreResult<Self> {
        let quantity = Quantity { value, unit };
        validation::validate_quantity(&quantity, true)?;
        Ok(quantity)
    }

    /// Shorthand for a count of pieces.
    pub fn pieces(value: f64) -> Self {
        Quantity {
            value,
            unit: Unit::Piece,
        }
    }

    /// Returns true if nothing is left.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.value <= QUANTITY_EPSILON
    }

    /// Expresses this quantity in `unit`.
    ///
    /// ## Example
    /// ```rust
    /// use pantry_core::{Quantity, Unit};
    ///
    /// let q = Quantity::new(1.5, Unit::Kilogram).unwrap();
    /// assert_eq!(q.convert_to(Unit::Gram).unwrap().value, 1500.0);
    /// assert!(q.convert_to(Unit::Liter).is_err());
    /// ```
    pub fn convert_to(&self, unit: Unit) -> CoreResult<Quantity> {
        if !self.unit.is_compatible_with(unit) {
            return Err(CoreError::IncompatibleUnit {
                expected: unit,
                actual: self.unit,
            });
        }

        if self.unit == unit {
            return Ok(*self);
        }

        let value = self.value * self.unit.base_factor() / unit.base_factor();
        Ok(Quantity { value, unit })
    }

    /// Sums two quantities, keeping `self`'s unit.
    pub fn checked_add(&self, other: &Quantity) -> CoreResult<Quantity> {
        let other = other.convert_to(self.unit)?;
        Ok(Quantity {
            value: self.value + other.value,
            unit: self.unit,
        })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

// =============================================================================
// Item Status
// =============================================================================

/// Lifecycle status of a batch.
///
/// ## Transitions
/// ```text
///            ┌──► Consumed
///  Active ───┼──► Discarded      (terminal states never change again)
///            └──► Archived
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Active,
    Consumed,
    Discarded,
    Archived,
}

impl ItemStatus {
    /// Returns the storage representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Active => "active",
            ItemStatus::Consumed => "consumed",
            ItemStatus::Discarded => "discarded",
            ItemStatus::Archived => "archived",
        }
    }

    /// Returns true for consumed, discarded and archived.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, ItemStatus::Active)
    }

    /// Returns true if moving from `self` to `next` is allowed.
    ///
    /// Same-status moves are allowed (no-op writes).
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        *self == next || *self == ItemStatus::Active
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ItemStatus::Active),
            "consumed" => Ok(ItemStatus::Consumed),
            "discarded" => Ok(ItemStatus::Discarded),
            "archived" => Ok(ItemStatus::Archived),
            _ => Err(ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: ["active", "consumed", "discarded", "archived"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
        }
    }
}

// =============================================================================
// Date Info
// =============================================================================

/// What kind of date was printed on (or inferred for) the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DateKind {
    UseBy,
    BestBefore,
    Expiry,
    Opened,
    Other,
}

/// A date observed for a batch, with its extraction provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DateInfo {
    pub kind: DateKind,

    /// Text as captured (e.g. "BB 12/03/26"), if any.
    pub raw_text: Option<String>,

    /// Extraction confidence in `[0, 1]`; manual entry uses 1.0.
    pub confidence: f64,

    /// The resolved instant, when the raw text could be interpreted.
    #[ts(as = "Option<String>")]
    pub resolved: Option<DateTime<Utc>>,
}

impl DateInfo {
    /// A manually entered, fully trusted date.
    pub fn manual(kind: DateKind, resolved: DateTime<Utc>) -> Self {
        DateInfo {
            kind,
            raw_text: None,
            confidence: 1.0,
            resolved: Some(resolved),
        }
    }
}

// =============================================================================
// Product Reference
// =============================================================================

/// Cached product details, frozen at capture time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductSnapshot {
    pub title: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub barcode: Option<String>,
}

/// Product identity plus an optional snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductRef {
    pub product_id: String,
    pub snapshot: Option<ProductSnapshot>,
}

impl ProductRef {
    /// A bare reference without cached details.
    pub fn new(product_id: impl Into<String>) -> Self {
        ProductRef {
            product_id: product_id.into(),
            snapshot: None,
        }
    }
}

// =============================================================================
// Inventory Draft
// =============================================================================

/// A normalized candidate batch, as produced by capture or manual entry.
///
/// This is the only shape in which extraction results reach the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryDraft {
    pub household_id: String,
    pub product: ProductRef,
    pub quantity: Quantity,
    pub storage_location_id: String,
    pub lot_code: Option<String>,
    pub expiry: Option<DateInfo>,
    pub opened: Option<DateInfo>,
    pub notes: Option<String>,
}

impl InventoryDraft {
    /// Minimal draft with no dates, lot code or notes.
    pub fn new(
        household_id: impl Into<String>,
        product_id: impl Into<String>,
        quantity: Quantity,
        storage_location_id: impl Into<String>,
    ) -> Self {
        InventoryDraft {
            household_id: household_id.into(),
            product: ProductRef::new(product_id),
            quantity,
            storage_location_id: storage_location_id.into(),
            lot_code: None,
            expiry: None,
            opened: None,
            notes: None,
        }
    }

    /// Sets the resolved expiry date (manual entry).
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(DateInfo::manual(DateKind::Expiry, expiry));
        self
    }

    /// Sets the lot or batch code.
    pub fn with_lot_code(mut self, lot_code: impl Into<String>) -> Self {
        self.lot_code = Some(lot_code.into());
        self
    }

    /// Validates every field of the draft.
    pub fn validate(&self) -> CoreResult<()> {
        validation::validate_id("household_id", &self.household_id)?;
        validation::validate_id("product_id", &self.product.product_id)?;
        validation::validate_id("storage_location_id", &self.storage_location_id)?;
        validation::validate_quantity(&self.quantity, false)?;
        if let Some(expiry) = &self.expiry {
            validation::validate_confidence("expiry", expiry.confidence)?;
        }
        if let Some(opened) = &self.opened {
            validation::validate_confidence("opened", opened.confidence)?;
        }
        if let Some(notes) = &self.notes {
            validation::validate_notes(notes)?;
        }
        Ok(())
    }
}

// =============================================================================
// Inventory Item
// =============================================================================

/// One physical batch of a product in a household.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryItem {
    /// Opaque unique identifier. Immutable once created.
    pub id: String,

    /// Owning household. Never empty.
    pub household_id: String,

    pub product: ProductRef,

    pub quantity: Quantity,

    pub status: ItemStatus,

    pub storage_location_id: String,

    pub lot_code: Option<String>,

    pub expiry: Option<DateInfo>,

    pub opened: Option<DateInfo>,

    pub notes: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Set when the batch was used up.
    #[ts(as = "Option<String>")]
    pub consumed_at: Option<DateTime<Utc>>,
}

impl InventoryItem {
    /// Builds a new active batch from a validated draft.
    pub fn from_draft(id: impl Into<String>, draft: InventoryDraft, now: DateTime<Utc>) -> CoreResult<Self> {
        draft.validate()?;
        let id = id.into();
        validation::validate_id("id", &id)?;

        Ok(InventoryItem {
            id,
            household_id: draft.household_id,
            product: draft.product,
            quantity: draft.quantity,
            status: ItemStatus::Active,
            storage_location_id: draft.storage_location_id,
            lot_code: draft.lot_code,
            expiry: draft.expiry,
            opened: draft.opened,
            notes: draft.notes,
            created_at: now,
            updated_at: now,
            consumed_at: None,
        })
    }

    /// Product id shortcut.
    #[inline]
    pub fn product_id(&self) -> &str {
        &self.product.product_id
    }

    /// Resolved expiry instant, if known.
    #[inline]
    pub fn expiry_date(&self) -> Option<DateTime<Utc>> {
        self.expiry.as_ref().and_then(|d| d.resolved)
    }

    /// Resolved opened instant, if known.
    #[inline]
    pub fn opened_date(&self) -> Option<DateTime<Utc>> {
        self.opened.as_ref().and_then(|d| d.resolved)
    }

    /// Returns true while the batch is on the shelf.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == ItemStatus::Active
    }

    /// Moves the batch to `next` status.
    ///
    /// ## Rules
    /// - `active → consumed | discarded | archived`
    /// - Same status is a no-op
    /// - Anything out of a terminal status fails
    pub fn transition(&mut self, next: ItemStatus, now: DateTime<Utc>) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidStatusTransition {
                item_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }

        if self.status == next {
            return Ok(());
        }

        self.status = next;
        self.updated_at = now;
        if next == ItemStatus::Consumed {
            self.consumed_at = Some(now);
        }
        Ok(())
    }

    /// Adds a merged observation's quantity to this batch.
    pub fn absorb(&mut self, quantity: &Quantity, now: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_active(ItemStatus::Active)?;
        self.quantity = self.quantity.checked_add(quantity)?;
        self.updated_at = now;
        Ok(())
    }

    /// Removes `amount` from this batch. Marks it consumed once empty.
    ///
    /// Returns the amount actually taken, in this batch's unit.
    pub fn take(&mut self, amount: &Quantity, now: DateTime<Utc>) -> CoreResult<Quantity> {
        self.ensure_active(ItemStatus::Consumed)?;
        let amount = amount.convert_to(self.quantity.unit)?;

        if amount.value > self.quantity.value + QUANTITY_EPSILON {
            return Err(CoreError::InsufficientStock {
                product_id: self.product.product_id.clone(),
                available: self.quantity.value,
                requested: amount.value,
            });
        }

        let remaining = (self.quantity.value - amount.value).max(0.0);
        self.quantity.value = if remaining <= QUANTITY_EPSILON { 0.0 } else { remaining };
        self.updated_at = now;

        if self.quantity.is_empty() {
            self.transition(ItemStatus::Consumed, now)?;
        }
        Ok(amount)
    }

    /// Moves the batch to another storage location.
    pub fn move_to(&mut self, location_id: impl Into<String>, now: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_active(ItemStatus::Active)?;
        let location_id = location_id.into();
        validation::validate_id("storage_location_id", &location_id)?;
        self.storage_location_id = location_id;
        self.updated_at = now;
        Ok(())
    }

    /// Replaces the expiry and opened dates.
    pub fn update_dates(
        &mut self,
        expiry: Option<DateInfo>,
        opened: Option<DateInfo>,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.ensure_active(ItemStatus::Active)?;
        if let Some(expiry) = &expiry {
            validation::validate_confidence("expiry", expiry.confidence)?;
        }
        if let Some(opened) = &opened {
            validation::validate_confidence("opened", opened.confidence)?;
        }
        self.expiry = expiry;
        self.opened = opened;
        self.updated_at = now;
        Ok(())
    }

    fn ensure_active(&self, attempted: ItemStatus) -> CoreResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(CoreError::InvalidStatusTransition {
                item_id: self.id.clone(),
                from: self.status,
                to: attempted,
            })
        }
    }
}

// =============================================================================
// Storage Location
// =============================================================================

/// A named place in a household (e.g. "Fridge").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StorageLocation {
    pub id: String,
    pub household_id: String,
    pub name: String,
    pub is_cold: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl StorageLocation {
    /// Creates a validated location.
    pub fn new(
        id: impl Into<String>,
        household_id: impl Into<String>,
        name: impl Into<String>,
        is_cold: bool,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let location = StorageLocation {
            id: id.into(),
            household_id: household_id.into(),
            name: name.into().trim().to_string(),
            is_cold,
            created_at: now,
            updated_at: now,
        };
        validation::validate_id("id", &location.id)?;
        validation::validate_id("household_id", &location.household_id)?;
        validation::validate_location_name(&location.name)?;
        Ok(location)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
