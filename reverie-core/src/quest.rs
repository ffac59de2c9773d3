//! Quest State Machine.
//!
//! ```text
//!   NotStarted ──start──▶ Active ──advance past last stage──▶ Completed (reward, once)
//!                           │
//!                           └──fail / abandon──▶ Failed (no reward)
//! ```
//!
//! An Active quest walks an ordered list of stages.  Objectives can be
//! completed in any order, even ahead of their stage, but a stage only
//! advances once all of its objectives are done.  Complications are
//! checked at advance time and may redirect to another stage or add
//! objectives to the current one.  Terminal states never reopen.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, ReverieError};
use crate::inventory::ItemTemplate;
use crate::npc::DispositionBand;
use crate::types::{LocationId, NpcId, ObjectiveId, QuestId, Stat, Turn};
use crate::world::LocationKind;

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    /// Offered but not accepted.
    NotStarted,
    /// In progress.
    Active,
    /// Done; reward applied.
    Completed,
    /// Failed or abandoned; no reward.
    Failed,
}

impl QuestStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// What completes an objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveGoal {
    /// Arrive at a specific location.
    Reach(LocationId),
    /// Arrive at any location of a kind.
    ReachKind(LocationKind),
    /// Talk to an NPC.
    TalkTo(NpcId),
    /// Win fights against this many enemies in total.
    DefeatEnemies(u32),
    /// Pick up an item with this name.
    Acquire(String),
    /// Reveal any secret.
    Discover,
    /// Completed only explicitly.
    Narrative,
}

/// One objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    /// Identity.
    pub id: ObjectiveId,
    /// Player-facing text.
    pub description: String,
    /// Completion rule.
    pub goal: ObjectiveGoal,
    /// Counter for cumulative goals.
    pub progress: u32,
    /// Done.
    pub complete: bool,
}

impl Objective {
    /// A fresh objective.
    #[must_use]
    pub fn new(description: impl Into<String>, goal: ObjectiveGoal) -> Self {
        Self {
            id: ObjectiveId::new(),
            description: description.into(),
            goal,
            progress: 0,
            complete: false,
        }
    }
}

/// An ordered step of a quest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestStage {
    /// Player-facing text.
    pub description: String,
    /// All must be complete to advance.
    pub objectives: Vec<Objective>,
}

impl QuestStage {
    /// A stage with objectives.
    #[must_use]
    pub fn new(description: impl Into<String>, objectives: Vec<Objective>) -> Self {
        Self {
            description: description.into(),
            objectives,
        }
    }

    /// Whether every objective is done.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.objectives.iter().all(|o| o.complete)
    }
}

/// When a complication fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplicationCondition {
    /// Always.
    Always,
    /// A particular objective is done.
    ObjectiveDone(ObjectiveId),
    /// A check succeeds (rolled by the caller).
    Check {
        /// Stat rolled.
        stat: Stat,
        /// Target number.
        difficulty: i32,
    },
    /// An NPC's band is at or below a threshold.
    NpcBandAtMost {
        /// The NPC.
        npc: NpcId,
        /// Threshold.
        band: DispositionBand,
    },
}

/// What a complication does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplicationEffect {
    /// Go to this stage index instead of the next one.
    Redirect(usize),
    /// Add objectives to the current stage.
    AddObjectives(Vec<Objective>),
}

/// A conditional branch evaluated when a stage is about to advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complication {
    /// Player-facing text.
    pub description: String,
    /// Stage index at which it is evaluated.
    pub at_stage: usize,
    /// Trigger.
    pub condition: ComplicationCondition,
    /// Effect.
    pub effect: ComplicationEffect,
    /// Fires at most once.
    pub triggered: bool,
}

/// What completing the quest grants.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reward {
    /// Gold.
    pub gold: u32,
    /// Experience.
    pub xp: u32,
    /// Items.
    pub items: Vec<ItemTemplate>,
    /// Disposition deltas per NPC.
    pub reputation: Vec<(NpcId, i32)>,
    /// Player-facing text.
    pub description: String,
}

/// Event fed to [`QuestBook::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestEvent<'a> {
    /// The player arrived somewhere.
    Arrived {
        /// Location id.
        location: LocationId,
        /// Location kind.
        kind: LocationKind,
    },
    /// The player talked to an NPC.
    TalkedTo(NpcId),
    /// The player won a fight against this many enemies.
    EnemiesDefeated(u32),
    /// The player picked up an item.
    Acquired(&'a str),
    /// The player revealed a secret.
    Discovered,
}

/// Result of [`Quest::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestProgress {
    /// The current stage still has open objectives.
    NotReady,
    /// Moved to another stage.
    StageAdvanced {
        /// Stage left.
        from: usize,
        /// Stage entered.
        to: usize,
        /// Complication that redirected, if any.
        complication: Option<String>,
    },
    /// A complication added objectives to the current stage.
    Complicated(String),
    /// The quest completed; this reward must be applied now.
    Completed(Reward),
}

// ---------------------------------------------------------------------------
// Quest
// ---------------------------------------------------------------------------

/// A quest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    /// Identity.
    pub id: QuestId,
    /// Title.
    pub title: String,
    /// Opening pitch.
    pub hook: String,
    /// Who offers it.
    pub giver: Option<NpcId>,
    /// Locations it involves.
    pub locations: Vec<LocationId>,
    /// Ordered stages.
    pub stages: Vec<QuestStage>,
    /// Index of the active stage.
    pub current_stage: usize,
    /// Conditional branches.
    pub complications: Vec<Complication>,
    /// Lifecycle state.
    pub status: QuestStatus,
    /// Reward payload.
    pub reward: Reward,
    /// Set exactly when the reward is handed out.
    pub reward_applied: bool,
    /// Why it failed.
    pub failure_reason: Option<String>,
    /// Turn it became Active.
    pub started_turn: Option<Turn>,
    /// Turn it ended.
    pub ended_turn: Option<Turn>,
}

impl Quest {
    /// A NotStarted quest.
    #[must_use]
    pub fn new(title: impl Into<String>, hook: impl Into<String>, stages: Vec<QuestStage>, reward: Reward) -> Self {
        Self {
            id: QuestId::new(),
            title: title.into(),
            hook: hook.into(),
            giver: None,
            locations: Vec::new(),
            stages,
            current_stage: 0,
            complications: Vec::new(),
            status: QuestStatus::NotStarted,
            reward,
            reward_applied: false,
            failure_reason: None,
            started_turn: None,
            ended_turn: None,
        }
    }

    /// Set the quest giver.
    #[must_use]
    pub fn with_giver(mut self, npc: NpcId) -> Self {
        self.giver = Some(npc);
        self
    }

    /// Add a complication.
    #[must_use]
    pub fn with_complication(
        mut self,
        description: impl Into<String>,
        at_stage: usize,
        condition: ComplicationCondition,
        effect: ComplicationEffect,
    ) -> Self {
        self.complications.push(Complication {
            description: description.into(),
            at_stage,
            condition,
            effect,
            triggered: false,
        });
        self
    }

    fn transition_error(&self, transition: &'static str) -> ReverieError {
        ReverieError::QuestTransition {
            quest: self.title.clone(),
            transition,
            status: self.status.to_string(),
        }
    }

    /// The active stage.
    #[must_use]
    pub fn stage(&self) -> Option<&QuestStage> {
        self.stages.get(self.current_stage)
    }

    /// NotStarted → Active.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::QuestTransition`] from any other state.
    pub fn start(&mut self, turn: Turn) -> Result<()> {
        if self.status != QuestStatus::NotStarted {
            return Err(self.transition_error("start"));
        }
        self.status = QuestStatus::Active;
        self.started_turn = Some(turn);
        tracing::info!(quest = %self.title, "quest started");
        Ok(())
    }

    /// Mark one objective complete, wherever it sits.  Returns whether it changed.
    ///
    /// # Errors
    ///
    /// Returns an error unless the quest is Active and owns the objective.
    pub fn complete_objective(&mut self, id: ObjectiveId) -> Result<bool> {
        if self.status != QuestStatus::Active {
            return Err(self.transition_error("complete an objective"));
        }
        let objective = self
            .stages
            .iter_mut()
            .flat_map(|s| s.objectives.iter_mut())
            .find(|o| o.id == id)
            .ok_or_else(|| ReverieError::unknown("objective", id))?;
        let changed = !objective.complete;
        objective.complete = true;
        Ok(changed)
    }

    /// Feed an event; returns the objectives it completed.
    pub fn observe(&mut self, event: &QuestEvent<'_>) -> Vec<ObjectiveId> {
        if self.status != QuestStatus::Active {
            return Vec::new();
        }
        let mut done = Vec::new();
        for objective in self
            .stages
            .iter_mut()
            .flat_map(|s| s.objectives.iter_mut())
            .filter(|o| !o.complete)
        {
            let hit = match (&objective.goal, event) {
                (ObjectiveGoal::Reach(want), QuestEvent::Arrived { location, .. }) => want == location,
                (ObjectiveGoal::ReachKind(want), QuestEvent::Arrived { kind, .. }) => want == kind,
                (ObjectiveGoal::TalkTo(want), QuestEvent::TalkedTo(npc)) => want == npc,
                (ObjectiveGoal::DefeatEnemies(need), QuestEvent::EnemiesDefeated(count)) => {
                    objective.progress = objective.progress.saturating_add(*count);
                    objective.progress >= *need
                }
                (ObjectiveGoal::Acquire(want), QuestEvent::Acquired(name)) => want.eq_ignore_ascii_case(name),
                (ObjectiveGoal::Discover, QuestEvent::Discovered) => true,
                _ => false,
            };
            if hit {
                objective.complete = true;
                done.push(objective.id);
            }
        }
        done
    }

    /// Try to leave the current stage.
    ///
    /// `check` decides complication conditions that need outside state
    /// (dice, NPC bands); it is only called for untriggered complications
    /// attached to the current stage.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::QuestTransition`] unless Active.
    pub fn advance(
        &mut self,
        turn: Turn,
        mut check: impl FnMut(&ComplicationCondition) -> bool,
    ) -> Result<QuestProgress> {
        if self.status != QuestStatus::Active {
            return Err(self.transition_error("advance"));
        }
        let Some(stage) = self.stages.get(self.current_stage) else {
            return Err(ReverieError::InvariantViolation(format!(
                "quest '{}' has no stage {}",
                self.title, self.current_stage
            )));
        };
        if !stage.is_complete() {
            return Ok(QuestProgress::NotReady);
        }

        let from = self.current_stage;
        let objective_done = |id: &ObjectiveId| {
            self.stages
                .iter()
                .flat_map(|s| s.objectives.iter())
                .any(|o| o.id == *id && o.complete)
        };
        let mut fired = None;
        for (index, complication) in self.complications.iter().enumerate() {
            if complication.triggered || complication.at_stage != from {
                continue;
            }
            let holds = match &complication.condition {
                ComplicationCondition::Always => true,
                ComplicationCondition::ObjectiveDone(id) => objective_done(id),
                other => check(other),
            };
            if holds {
                fired = Some(index);
                break;
            }
        }

        if let Some(index) = fired {
            let complication = &mut self.complications[index];
            complication.triggered = true;
            let description = complication.description.clone();
            match complication.effect.clone() {
                ComplicationEffect::Redirect(to) if to < self.stages.len() => {
                    self.current_stage = to;
                    return Ok(QuestProgress::StageAdvanced {
                        from,
                        to,
                        complication: Some(description),
                    });
                }
                ComplicationEffect::Redirect(to) => {
                    return Err(ReverieError::InvariantViolation(format!(
                        "complication redirects to missing stage {to}"
                    )));
                }
                ComplicationEffect::AddObjectives(objectives) => {
                    self.stages[from].objectives.extend(objectives);
                    return Ok(QuestProgress::Complicated(description));
                }
            }
        }

        if from + 1 < self.stages.len() {
            self.current_stage = from + 1;
            return Ok(QuestProgress::StageAdvanced {
                from,
                to: from + 1,
                complication: None,
            });
        }
        match self.complete(turn)? {
            Some(reward) => Ok(QuestProgress::Completed(reward)),
            None => Ok(QuestProgress::NotReady),
        }
    }

    /// Enter Completed.  Returns the reward the first time only.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::QuestTransition`] from NotStarted or Failed.
    pub fn complete(&mut self, turn: Turn) -> Result<Option<Reward>> {
        match self.status {
            QuestStatus::Completed => Ok(None),
            QuestStatus::Active => {
                self.status = QuestStatus::Completed;
                self.ended_turn = Some(turn);
                self.reward_applied = true;
                tracing::info!(quest = %self.title, gold = self.reward.gold, "quest completed");
                Ok(Some(self.reward.clone()))
            }
            QuestStatus::NotStarted | QuestStatus::Failed => Err(self.transition_error("complete")),
        }
    }

    /// Enter Failed.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::QuestTransition`] from a terminal state.
    pub fn fail(&mut self, reason: impl Into<String>, turn: Turn) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.transition_error("fail"));
        }
        self.status = QuestStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.ended_turn = Some(turn);
        tracing::info!(quest = %self.title, "quest failed");
        Ok(())
    }

    /// Player gives up an Active quest.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::QuestTransition`] unless Active.
    pub fn abandon(&mut self, turn: Turn) -> Result<()> {
        if self.status != QuestStatus::Active {
            return Err(self.transition_error("abandon"));
        }
        self.fail("abandoned", turn)
    }

    /// Check structural and reward invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ReverieError::InvariantViolation`] naming the broken rule.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(ReverieError::InvariantViolation(format!("quest '{}': {msg}", self.title)));
        if self.stages.is_empty() {
            return fail("has no stages".into());
        }
        if self.current_stage >= self.stages.len() {
            return fail(format!("current stage {} out of range", self.current_stage));
        }
        if self.reward_applied != (self.status == QuestStatus::Completed) {
            return fail(format!(
                "reward_applied is {} while {}",
                self.reward_applied, self.status
            ));
        }
        if let Some(bad) = self.complications.iter().find(|c| {
            c.at_stage >= self.stages.len()
                || matches!(c.effect, ComplicationEffect::Redirect(to) if to >= self.stages.len())
        }) {
            return fail(format!("complication '{}' points outside the stages", bad.description));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Quest book
// ---------------------------------------------------------------------------

/// Arena of every quest in a save.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestBook {
    quests: BTreeMap<QuestId, Quest>,
}

impl QuestBook {
    /// Add a quest.
    pub fn insert(&mut self, quest: Quest) -> QuestId {
        let id = quest.id;
        self.quests.insert(id, quest);
        id
    }

    /// Look up a quest.
    #[must_use]
    pub fn get(&self, id: QuestId) -> Option<&Quest> {
        self.quests.get(&id)
    }

    /// Look up a quest mutably.
    pub fn get_mut(&mut self, id: QuestId) -> Option<&mut Quest> {
        self.quests.get_mut(&id)
    }

    /// Every quest.
    pub fn iter(&self) -> impl Iterator<Item = &Quest> {
        self.quests.values()
    }

    /// Active quests.
    pub fn active(&self) -> impl Iterator<Item = &Quest> {
        self.quests.values().filter(|q| q.status == QuestStatus::Active)
    }

    /// A NotStarted quest this NPC offers.
    #[must_use]
    pub fn offered_by(&self, npc: NpcId) -> Option<&Quest> {
        self.quests
            .values()
            .find(|q| q.giver == Some(npc) && q.status == QuestStatus::NotStarted)
    }

    /// Feed an event to every Active quest.
    pub fn observe(&mut self, event: &QuestEvent<'_>) -> Vec<(QuestId, ObjectiveId)> {
        self.quests
            .values_mut()
            .flat_map(|q| {
                let id = q.id;
                q.observe(event).into_iter().map(move |o| (id, o))
            })
            .collect()
    }

    /// Ids of Active quests whose current stage is complete.
    #[must_use]
    pub fn ready_to_advance(&self) -> Vec<QuestId> {
        self.active()
            .filter(|q| q.stage().is_some_and(QuestStage::is_complete))
            .map(|q| q.id)
            .collect()
    }

    /// Validate every quest.
    ///
    /// # Errors
    ///
    /// Returns the first quest's violation.
    pub fn validate(&self) -> Result<()> {
        self.quests.values().try_for_each(Quest::validate)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn two_stage() -> Quest {
        Quest::new(
            "Lost Ledger",
            "The innkeeper lost her ledger.",
            vec![
                QuestStage::new("Find it", vec![Objective::new("Search the cellar", ObjectiveGoal::Discover)]),
                QuestStage::new(
                    "Return it",
                    vec![Objective::new("Bring it back", ObjectiveGoal::Narrative)],
                ),
            ],
            Reward {
                gold: 30,
                xp: 50,
                ..Reward::default()
            },
        )
    }

    fn never(_: &ComplicationCondition) -> bool {
        false
    }

    #[test]
    fn cannot_progress_before_start() {
        let mut quest = two_stage();
        assert!(quest.advance(1, never).is_err());
        assert!(quest.complete(1).is_err());
    }

    #[test]
    fn stage_waits_for_all_objectives() {
        let mut quest = two_stage();
        quest.start(1).expect("start");
        assert_eq!(quest.advance(1, never).expect("advance"), QuestProgress::NotReady);
        quest.observe(&QuestEvent::Discovered);
        assert!(matches!(
            quest.advance(2, never).expect("advance"),
            QuestProgress::StageAdvanced { from: 0, to: 1, complication: None }
        ));
    }

    #[test]
    fn objectives_complete_out_of_order() {
        let mut quest = two_stage();
        quest.start(1).expect("start");
        let later = quest.stages[1].objectives[0].id;
        assert!(quest.complete_objective(later).expect("complete"));
        assert_eq!(quest.current_stage, 0);
        quest.observe(&QuestEvent::Discovered);
        quest.advance(2, never).expect("to stage 1");
        assert!(matches!(quest.advance(3, never).expect("finish"), QuestProgress::Completed(_)));
    }

    #[test]
    fn reward_is_handed_out_once() {
        let mut quest = two_stage();
        quest.start(1).expect("start");
        let first = quest.complete(2).expect("complete");
        let second = quest.complete(3).expect("re-trigger");
        assert_eq!(first.map(|r| r.gold), Some(30));
        assert!(second.is_none());
        assert!(quest.reward_applied);
        quest.validate().expect("valid");
    }

    #[test]
    fn failed_is_terminal_without_reward() {
        let mut quest = two_stage();
        quest.start(1).expect("start");
        quest.abandon(2).expect("abandon");
        assert_eq!(quest.status, QuestStatus::Failed);
        assert_eq!(quest.failure_reason.as_deref(), Some("abandoned"));
        assert!(quest.complete(3).is_err());
        assert!(quest.start(3).is_err());
        assert!(!quest.reward_applied);
    }

    #[test]
    fn complication_redirects() {
        let mut quest = Quest::new(
            "Fork",
            "Two roads.",
            vec![
                QuestStage::new("Start", vec![Objective::new("Begin", ObjectiveGoal::Narrative)]),
                QuestStage::new("Easy road", vec![Objective::new("Walk", ObjectiveGoal::Narrative)]),
                QuestStage::new("Hard road", vec![Objective::new("Climb", ObjectiveGoal::Narrative)]),
            ],
            Reward::default(),
        )
        .with_complication(
            "A rockslide blocks the easy road",
            0,
            ComplicationCondition::Check { stat: Stat::Wit, difficulty: 12 },
            ComplicationEffect::Redirect(2),
        );
        quest.start(1).expect("start");
        let first = quest.stages[0].objectives[0].id;
        quest.complete_objective(first).expect("complete");
        let progress = quest.advance(2, |_| true).expect("advance");
        assert_eq!(
            progress,
            QuestProgress::StageAdvanced {
                from: 0,
                to: 2,
                complication: Some("A rockslide blocks the easy road".into())
            }
        );
    }

    #[test]
    fn complication_adds_objectives_then_reward_still_applies() {
        let mut quest = two_stage().with_complication(
            "The ledger is in pieces",
            1,
            ComplicationCondition::Always,
            ComplicationEffect::AddObjectives(vec![Objective::new("Glue it", ObjectiveGoal::Narrative)]),
        );
        quest.start(1).expect("start");
        quest.observe(&QuestEvent::Discovered);
        quest.advance(2, never).expect("stage 1");
        let bring = quest.stages[1].objectives[0].id;
        quest.complete_objective(bring).expect("bring");
        assert!(matches!(quest.advance(3, never).expect("complicate"), QuestProgress::Complicated(_)));
        assert_eq!(quest.advance(3, never).expect("wait"), QuestProgress::NotReady);
        let glue = quest.stages[1].objectives[1].id;
        quest.complete_objective(glue).expect("glue");
        assert!(matches!(quest.advance(4, never).expect("finish"), QuestProgress::Completed(_)));
    }

    #[test]
    fn defeat_goal_accumulates() {
        let mut quest = Quest::new(
            "Cull",
            "Too many bugs.",
            vec![QuestStage::new("Fight", vec![Objective::new("Defeat 3", ObjectiveGoal::DefeatEnemies(3))])],
            Reward::default(),
        );
        quest.start(1).expect("start");
        assert!(quest.observe(&QuestEvent::EnemiesDefeated(2)).is_empty());
        assert_eq!(quest.observe(&QuestEvent::EnemiesDefeated(1)).len(), 1);
    }

    #[test]
    fn book_finds_offers() {
        let npc = NpcId::new();
        let mut book = QuestBook::default();
        let id = book.insert(two_stage().with_giver(npc));
        assert_eq!(book.offered_by(npc).map(|q| q.id), Some(id));
        book.get_mut(id).expect("quest").start(1).expect("start");
        assert!(book.offered_by(npc).is_none());
        assert_eq!(book.active().count(), 1);
    }
}
