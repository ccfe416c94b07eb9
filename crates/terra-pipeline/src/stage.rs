//! Linear stage machine: Topology -> Erosion -> Coloring -> Sectioned.

/// Editing stage of the landscape pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// Noise-based initial terrain.
    Topology,
    /// Hydraulic, thermal and blur passes over the terrain.
    Erosion,
    /// Material colouring of the eroded terrain.
    Coloring,
    /// Cut-away view of the finished landscape.
    Sectioned,
}

impl PipelineStage {
    pub const ALL: [Self; 4] = [Self::Topology, Self::Erosion, Self::Coloring, Self::Sectioned];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    pub fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }
}

/// Visibility, editability and dirty flag of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageState {
    pub visible: bool,
    pub enabled: bool,
    /// Set when the stage edited the landscape since the next stage last
    /// took its snapshot.
    pub changed: bool,
}

/// Callbacks into the presentation layer.
///
/// `show`/`hide` attach and detach a stage's resources; `enable`/`disable`
/// toggle its edit controls. The two pairs are independent.
pub trait StageHooks: Send + Sync {
    fn show(&self, _stage: PipelineStage) {}
    fn hide(&self, _stage: PipelineStage) {}
    fn enable(&self, _stage: PipelineStage) {}
    fn disable(&self, _stage: PipelineStage) {}
}

/// Hooks for headless use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl StageHooks for NoopHooks {}

/// A move between two adjacent stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: PipelineStage,
    pub to: PipelineStage,
    /// The upstream stage of `to` changed, so `to` must rebuild its snapshot.
    pub recompute: bool,
}

#[derive(Debug, Clone)]
pub struct StageMachine {
    current: PipelineStage,
    states: [StageState; 4],
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StageMachine {
    /// Starts in `Topology`, visible and editable.
    pub fn new() -> Self {
        let mut states = [StageState::default(); 4];
        states[0] = StageState {
            visible: true,
            enabled: true,
            changed: false,
        };
        Self {
            current: PipelineStage::Topology,
            states,
        }
    }

    pub fn current(&self) -> PipelineStage {
        self.current
    }

    pub fn state(&self, stage: PipelineStage) -> StageState {
        self.states[stage.index()]
    }

    pub fn mark_changed(&mut self, stage: PipelineStage) {
        self.states[stage.index()].changed = true;
    }

    pub fn set_visible(&mut self, stage: PipelineStage, visible: bool) {
        self.states[stage.index()].visible = visible;
    }

    pub fn set_enabled(&mut self, stage: PipelineStage, enabled: bool) {
        self.states[stage.index()].enabled = enabled;
    }

    /// Move forward one stage, or `None` at the last stage.
    pub fn advance(&mut self) -> Option<Transition> {
        let to = self.current.next()?;
        Some(self.enter(to))
    }

    /// Move back one stage, or `None` at the first stage.
    pub fn retreat(&mut self) -> Option<Transition> {
        let to = self.current.previous()?;
        Some(self.enter(to))
    }

    /// Undo `transition` after its recompute failed.
    ///
    /// `from` becomes current, visible and editable again, `to` is hidden and
    /// the consumed dirty flag is restored so the next attempt recomputes.
    pub fn revert(&mut self, transition: Transition) {
        let Transition { from, to, recompute } = transition;
        if recompute && let Some(upstream) = to.previous() {
            self.states[upstream.index()].changed = true;
        }
        self.states[to.index()].visible = false;
        self.states[to.index()].enabled = false;
        self.states[from.index()].visible = true;
        self.states[from.index()].enabled = true;
        self.current = from;
    }

    /// Switch to `to`, consuming the dirty flag of its upstream stage.
    fn enter(&mut self, to: PipelineStage) -> Transition {
        let from = self.current;
        let recompute = match to.previous() {
            Some(upstream) => std::mem::take(&mut self.states[upstream.index()].changed),
            None => false,
        };
        self.current = to;
        Transition {
            from,
            to,
            recompute,
        }
    }
}
