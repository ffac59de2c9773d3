//! Inventory: slot-bounded item stacks, equipment slots, gold.
//!
//! Capacity counts slots, not items: a stack of five potions is one slot,
//! key items take none.  At most one item may sit in each equipment slot.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::character::PlayerClass;
use crate::error::{Result, ReverieError};
use crate::types::{ItemId, Stat};

/// Default slot capacity for a new inventory.
pub const DEFAULT_CAPACITY: usize = 10;

// ---------------------------------------------------------------------------
// Item model
// ---------------------------------------------------------------------------

/// Equipment slot an item can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipSlot {
    /// Adds to attack checks.
    Weapon,
    /// Makes the player harder to hit.
    Armor,
    /// Adds to checks on one stat.
    Accessory,
}

impl fmt::Display for EquipSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Weapon => write!(f, "weapon"),
            Self::Armor => write!(f, "armor"),
            Self::Accessory => write!(f, "accessory"),
        }
    }
}

/// What a consumable does when used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumableEffect {
    /// Recover danger steps.
    Recover {
        /// Steps toward Fresh.
        steps: u8,
    },
    /// Bonus to the next checks on a stat.
    Boost {
        /// Stat boosted.
        stat: Stat,
        /// Modifier added.
        amount: i32,
        /// Number of checks the boost lasts.
        checks: u8,
    },
}

/// Item category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Equippable in the weapon slot.
    Weapon {
        /// Attack modifier while equipped.
        bonus: i32,
    },
    /// Equippable in the armor slot.
    Armor {
        /// Added to enemy attack difficulty while equipped.
        bonus: i32,
    },
    /// Equippable in the accessory slot.
    Accessory {
        /// Stat the accessory helps.
        stat: Stat,
        /// Modifier while equipped.
        bonus: i32,
    },
    /// Used up on use.
    Consumable(ConsumableEffect),
    /// Plot item; takes no slot, cannot be dropped.
    Key,
    /// Anything else.
    Misc,
}

impl ItemKind {
    /// The equipment slot this kind fits, if any.
    #[must_use]
    pub const fn slot(&self) -> Option<EquipSlot> {
        match self {
            Self::Weapon { .. } => Some(EquipSlot::Weapon),
            Self::Armor { .. } => Some(EquipSlot::Armor),
            Self::Accessory { .. } => Some(EquipSlot::Accessory),
            _ => None,
        }
    }

    const fn stackable(&self) -> bool {
        matches!(self, Self::Consumable(_) | Self::Misc)
    }
}

/// Blueprint for an item that does not exist yet (quest rewards, loot, kits).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTemplate {
    /// Display name.
    pub name: String,
    /// Flavor text.
    pub description: String,
    /// Category.
    pub kind: ItemKind,
    /// Trade value in gold.
    pub value: u32,
    /// Quantity granted.
    pub quantity: u32,
}

impl ItemTemplate {
    /// Convenience constructor for a single item.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: ItemKind, value: u32) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            value,
            quantity: 1,
        }
    }

    /// Set the quantity.
    #[must_use]
    pub fn times(mut self, quantity: u32) -> Self {
        self.quantity = quantity.max(1);
        self
    }
}

/// An item stack the player owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Identity of the stack.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Flavor text.
    pub description: String,
    /// Category and effect.
    pub kind: ItemKind,
    /// Trade value per unit.
    pub value: u32,
    /// Units in the stack (1 for non-stackables).
    pub quantity: u32,
    /// Slot this item is equipped in, if any.
    pub equipped: Option<EquipSlot>,
}

impl InventoryItem {
    /// Whether this stack uses an inventory slot.
    #[must_use]
    pub fn occupies_slot(&self) -> bool {
        !matches!(self.kind, ItemKind::Key)
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Result of using a consumable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedItem {
    /// Item name.
    pub name: String,
    /// What it does.
    pub effect: ConsumableEffect,
}

/// Active temporary stat boost from a consumable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveBoost {
    /// Stat boosted.
    pub stat: Stat,
    /// Modifier added.
    pub amount: i32,
    /// Checks remaining.
    pub checks_left: u8,
}

/// The player's possessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    capacity: usize,
    items: Vec<InventoryItem>,
    /// Gold on hand.
    pub gold: u32,
    /// Temporary boosts from consumables.
    pub boosts: Vec<ActiveBoost>,
}

impl Inventory {
    /// An empty inventory with the given slot capacity.
    #[must_use]
    pub fn new(capacity: usize, gold: u32) -> Self {
        Self {
            capacity,
            items: Vec::new(),
            gold,
            boosts: Vec::new(),
        }
    }

    /// Declared slot capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently used.
    #[must_use]
    pub fn slots_used(&self) -> usize {
        self.items.iter().filter(|i| i.occupies_slot()).count()
    }

    /// All stacks, in acquisition order.
    #[must_use]
    pub fn items(&self) -> &[InventoryItem] {
        &self.items
    }

    /// Look up a stack by id.
    #[must_use]
    pub fn get(&self, id: ItemId) -> Option<&InventoryItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Case-insensitive lookup by exact name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&InventoryItem> {
        self.items.iter().find(|i| i.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Add items from a template, stacking onto an existing stack when possible.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InventoryFull`] if a new slot is needed and none
    /// is free.  The inventory is unchanged on error.
    pub fn add(&mut self, template: &ItemTemplate) -> Result<ItemId> {
        if template.kind.stackable() {
            if let Some(stack) = self
                .items
                .iter_mut()
                .find(|i| i.kind == template.kind && i.name.eq_ignore_ascii_case(&template.name))
            {
                stack.quantity = stack.quantity.saturating_add(template.quantity.max(1));
                return Ok(stack.id);
            }
        }
        let item = InventoryItem {
            id: ItemId::new(),
            name: template.name.clone(),
            description: template.description.clone(),
            kind: template.kind,
            value: template.value,
            quantity: if template.kind.stackable() { template.quantity.max(1) } else { 1 },
            equipped: None,
        };
        if item.occupies_slot() && self.slots_used() >= self.capacity {
            return Err(ReverieError::InventoryFull {
                capacity: self.capacity,
            });
        }
        let id = item.id;
        self.items.push(item);
        Ok(id)
    }

    /// Remove `quantity` units from a stack, deleting it when empty.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvalidTargetReference`] for an unknown item, or
    /// [`ReverieError::InvariantViolation`] when removing a key item or more
    /// units than the stack holds.
    pub fn remove(&mut self, id: ItemId, quantity: u32) -> Result<InventoryItem> {
        let index = self
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| ReverieError::unknown("item", id))?;
        let stack = &mut self.items[index];
        if matches!(stack.kind, ItemKind::Key) {
            return Err(ReverieError::InvariantViolation(format!(
                "key item '{}' cannot be removed",
                stack.name
            )));
        }
        if quantity == 0 || quantity > stack.quantity {
            return Err(ReverieError::InvariantViolation(format!(
                "cannot remove {quantity} of '{}' (have {})",
                stack.name, stack.quantity
            )));
        }
        if quantity < stack.quantity {
            stack.quantity -= quantity;
            let mut taken = stack.clone();
            taken.quantity = quantity;
            taken.equipped = None;
            return Ok(taken);
        }
        Ok(self.items.remove(index))
    }

    /// Equip an item into its slot, unequipping whatever was there.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown or non-equippable items.
    pub fn equip(&mut self, id: ItemId) -> Result<EquipSlot> {
        let slot = self
            .get(id)
            .ok_or_else(|| ReverieError::unknown("item", id))?
            .kind
            .slot()
            .ok_or_else(|| ReverieError::InvariantViolation("item cannot be equipped".into()))?;
        for item in &mut self.items {
            if item.equipped == Some(slot) {
                item.equipped = None;
            }
        }
        if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
            item.equipped = Some(slot);
        }
        Ok(slot)
    }

    /// Take an item out of its slot.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown items.
    pub fn unequip(&mut self, id: ItemId) -> Result<Option<EquipSlot>> {
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| ReverieError::unknown("item", id))?;
        Ok(item.equipped.take())
    }

    /// The item currently equipped in `slot`.
    #[must_use]
    pub fn equipped(&self, slot: EquipSlot) -> Option<&InventoryItem> {
        self.items.iter().find(|i| i.equipped == Some(slot))
    }

    /// Consume one unit of a consumable.  Boost effects are registered here;
    /// recovery effects are returned for the caller to apply to the character.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown or non-consumable items.
    pub fn use_consumable(&mut self, id: ItemId) -> Result<UsedItem> {
        let item = self.get(id).ok_or_else(|| ReverieError::unknown("item", id))?;
        let ItemKind::Consumable(effect) = item.kind else {
            return Err(ReverieError::InvariantViolation(format!(
                "'{}' is not consumable",
                item.name
            )));
        };
        let name = item.name.clone();
        self.remove(id, 1)?;
        if let ConsumableEffect::Boost { stat, amount, checks } = effect {
            self.boosts.push(ActiveBoost {
                stat,
                amount,
                checks_left: checks.max(1),
            });
        }
        Ok(UsedItem { name, effect })
    }

    /// Equipment and boost modifier for a check on `stat`, without consuming boosts.
    #[must_use]
    pub fn stat_bonus(&self, stat: Stat) -> i32 {
        let accessory = match self.equipped(EquipSlot::Accessory).map(|i| i.kind) {
            Some(ItemKind::Accessory { stat: s, bonus }) if s == stat => bonus,
            _ => 0,
        };
        let boosts: i32 = self.boosts.iter().filter(|b| b.stat == stat).map(|b| b.amount).sum();
        accessory + boosts
    }

    /// Spend one check's worth of every boost on `stat`.
    pub fn consume_boosts(&mut self, stat: Stat) {
        for boost in self.boosts.iter_mut().filter(|b| b.stat == stat) {
            boost.checks_left = boost.checks_left.saturating_sub(1);
        }
        self.boosts.retain(|b| b.checks_left > 0);
    }

    /// Attack modifier of the equipped weapon.
    #[must_use]
    pub fn weapon_bonus(&self) -> i32 {
        match self.equipped(EquipSlot::Weapon).map(|i| i.kind) {
            Some(ItemKind::Weapon { bonus }) => bonus,
            _ => 0,
        }
    }

    /// Defense modifier of the equipped armor.
    #[must_use]
    pub fn armor_bonus(&self) -> i32 {
        match self.equipped(EquipSlot::Armor).map(|i| i.kind) {
            Some(ItemKind::Armor { bonus }) => bonus,
            _ => 0,
        }
    }

    /// Add gold.
    pub fn add_gold(&mut self, amount: u32) {
        self.gold = self.gold.saturating_add(amount);
    }

    /// Spend gold.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InsufficientGold`] and spends nothing if short.
    pub fn spend_gold(&mut self, amount: u32) -> Result<()> {
        if amount > self.gold {
            return Err(ReverieError::InsufficientGold {
                needed: amount,
                available: self.gold,
            });
        }
        self.gold -= amount;
        Ok(())
    }

    /// Check slot capacity and slot uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvariantViolation`] naming the broken rule.
    pub fn validate(&self) -> Result<()> {
        if self.slots_used() > self.capacity {
            return Err(ReverieError::InvariantViolation(format!(
                "inventory uses {} slots but capacity is {}",
                self.slots_used(),
                self.capacity
            )));
        }
        for slot in [EquipSlot::Weapon, EquipSlot::Armor, EquipSlot::Accessory] {
            let in_slot = self.items.iter().filter(|i| i.equipped == Some(slot)).count();
            if in_slot > 1 {
                return Err(ReverieError::InvariantViolation(format!(
                    "{in_slot} items equipped as {slot}"
                )));
            }
        }
        if let Some(bad) = self
            .items
            .iter()
            .find(|i| i.equipped.is_some() && i.equipped != i.kind.slot())
        {
            return Err(ReverieError::InvariantViolation(format!(
                "'{}' is equipped in a slot it does not fit",
                bad.name
            )));
        }
        if let Some(empty) = self.items.iter().find(|i| i.quantity == 0) {
            return Err(ReverieError::InvariantViolation(format!(
                "empty stack '{}'",
                empty.name
            )));
        }
        Ok(())
    }
}

/// Starting kit for a class.  The first weapon and armor are equipped by
/// [`crate::SaveGame::new`].
#[must_use]
pub fn starting_kit(class: PlayerClass) -> Vec<ItemTemplate> {
    let potion = ItemTemplate::new(
        "Coffee Flask",
        "Bitter, hot, restorative.",
        ItemKind::Consumable(ConsumableEffect::Recover { steps: 1 }),
        10,
    );
    let mut kit = match class {
        PlayerClass::CodeWarrior => vec![
            ItemTemplate::new("Mechanical Keyboard", "Heavy, loud, surprisingly sharp.", ItemKind::Weapon { bonus: 2 }, 30),
            ItemTemplate::new("Hoodie of Focus", "Noise-cancelling, in spirit.", ItemKind::Armor { bonus: 1 }, 15),
        ],
        PlayerClass::MeetingSurvivor => vec![
            ItemTemplate::new("Laser Pointer", "Commands attention.", ItemKind::Weapon { bonus: 1 }, 10),
            ItemTemplate::new("Agenda Scroll", "Nobody reads it but you.", ItemKind::Accessory { stat: Stat::Spirit, bonus: 1 }, 12),
        ],
        PlayerClass::InboxKnight => vec![
            ItemTemplate::new("Reply-All Shield", "Deflects everything back at everyone.", ItemKind::Armor { bonus: 2 }, 35),
            ItemTemplate::new("Stapler", "Blunt instrument of office.", ItemKind::Weapon { bonus: 1 }, 8),
        ],
        PlayerClass::Wanderer => vec![
            ItemTemplate::new("Walking Staff", "Worn smooth by many roads.", ItemKind::Weapon { bonus: 1 }, 8),
            ItemTemplate::new("Trail Rations", "Dry, filling.", ItemKind::Misc, 2).times(3),
        ],
        PlayerClass::StackOverflow => vec![
            ItemTemplate::new("Tome of Answers", "Marked as duplicate.", ItemKind::Accessory { stat: Stat::Wit, bonus: 1 }, 25),
            ItemTemplate::new("Rubber Duck", "Listens patiently.", ItemKind::Misc, 3),
        ],
        PlayerClass::ScrumMaster => vec![
            ItemTemplate::new("Sticky-Note Bandolier", "Each note a tiny plan.", ItemKind::Accessory { stat: Stat::Spirit, bonus: 1 }, 15),
            ItemTemplate::new("Story-Point Dice", "Weighted toward eight.", ItemKind::Weapon { bonus: 1 }, 10),
        ],
        PlayerClass::LegacyMaintainer => vec![
            ItemTemplate::new("COBOL Manual", "Thick enough to stop an arrow.", ItemKind::Armor { bonus: 1 }, 20),
            ItemTemplate::new("Debugger Wrench", "Finds the fault by hitting it.", ItemKind::Weapon { bonus: 1 }, 15),
        ],
        PlayerClass::DeployNinja => vec![
            ItemTemplate::new("Rollback Dagger", "Undoes what it cuts.", ItemKind::Weapon { bonus: 2 }, 25),
            ItemTemplate::new("Smoke Pipeline", "Makes a quick exit quicker.", ItemKind::Consumable(ConsumableEffect::Boost { stat: Stat::Wit, amount: 2, checks: 2 }), 15),
        ],
    };
    kit.push(potion.times(2));
    kit
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
