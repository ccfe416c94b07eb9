//! Sequencing of the erosion simulators behind one single-flight guard.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use terra_erosion::{
    BlurFilter, ComputeDevice, ConfigurationError, DisplacementRadiusEstimator,
    DisplacementRangeReducer, DisplacementSource, DropletTables, ErosionError, ErosionParameter,
    ErosionParameters, FlightGuard, HeightField, HeightFieldBuffer, HydraulicErosionSimulator,
    RunOutcome, SingleFlight, TerrainLayout, ThermalErosionSimulator, TopologyGenerator,
    TopologyParams, WaterSimulator,
};

use crate::scheduler::ContinuousRunner;
use crate::stage::{NoopHooks, PipelineStage, StageHooks, StageMachine, StageState, Transition};

/// Owns the canonical height field and every simulator that touches it.
///
/// Each `run_*` method claims the orchestrator's guard first. While any run
/// or stage transition is in flight, further calls return
/// [`RunOutcome::Skipped`] immediately; they are neither queued nor retried.
/// Published results (height, water, sediment, displacement) are replaced
/// only after the producing run has finished its readback.
pub struct PipelineOrchestrator<D, H = NoopHooks> {
    device: Arc<D>,
    layout: TerrainLayout,
    hooks: H,
    params: Mutex<ErosionParameters>,
    topology: Mutex<TopologyParams>,
    machine: Mutex<StageMachine>,
    height: HeightFieldBuffer,
    hydraulic: HydraulicErosionSimulator<D>,
    thermal: ThermalErosionSimulator<D>,
    water: WaterSimulator<D>,
    blur: BlurFilter<D>,
    range: DisplacementRangeReducer<D>,
    radius: DisplacementRadiusEstimator,
    displacement: RwLock<Option<DisplacementSource>>,
    flight: SingleFlight,
}

impl<D: ComputeDevice> PipelineOrchestrator<D, NoopHooks> {
    pub fn new(
        device: Arc<D>,
        layout: TerrainLayout,
        params: ErosionParameters,
        topology: TopologyParams,
    ) -> Result<Self, ErosionError> {
        Self::with_hooks(device, layout, params, topology, NoopHooks)
    }
}

impl<D: ComputeDevice, H: StageHooks> PipelineOrchestrator<D, H> {
    /// Allocate every simulator for `layout`. Fails on invalid parameters or
    /// sizes; no GPU work is submitted yet.
    pub fn with_hooks(
        device: Arc<D>,
        layout: TerrainLayout,
        params: ErosionParameters,
        topology: TopologyParams,
        hooks: H,
    ) -> Result<Self, ErosionError> {
        params.validate()?;
        topology.validate()?;
        let seed = topology.seed as u32;
        let tables = Arc::new(DropletTables::upload(&*device, layout)?);
        let mesh_depth = layout.mesh_size() * layout.height() as f32 / layout.width() as f32;

        let orchestrator = Self {
            height: HeightFieldBuffer::new(&*device, "height", layout)?,
            hydraulic: HydraulicErosionSimulator::new(device.clone(), tables.clone(), seed)?,
            thermal: ThermalErosionSimulator::new(device.clone(), layout)?,
            water: WaterSimulator::new(device.clone(), tables, seed ^ 0x5bd1_e995)?,
            blur: BlurFilter::new(device.clone(), layout)?,
            range: DisplacementRangeReducer::new(device.clone(), layout)?,
            radius: DisplacementRadiusEstimator::new(layout.mesh_size(), mesh_depth)?,
            device,
            layout,
            hooks,
            params: Mutex::new(params),
            topology: Mutex::new(topology),
            machine: Mutex::new(StageMachine::new()),
            displacement: RwLock::new(None),
            flight: SingleFlight::new(),
        };

        orchestrator.hooks.show(PipelineStage::Topology);
        orchestrator.hooks.enable(PipelineStage::Topology);
        tracing::info!(
            width = layout.width(),
            height = layout.height(),
            lanes = layout.lanes(),
            "Pipeline orchestrator ready"
        );
        Ok(orchestrator)
    }

    pub fn layout(&self) -> &TerrainLayout {
        &self.layout
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Whether a run or stage transition currently holds the guard.
    pub fn is_running(&self) -> bool {
        self.flight.is_running()
    }

    pub fn current_stage(&self) -> PipelineStage {
        self.machine().current()
    }

    pub fn stage_state(&self, stage: PipelineStage) -> StageState {
        self.machine().state(stage)
    }

    /// Flag `stage` as edited so the next stage rebuilds its snapshot.
    pub fn mark_changed(&self, stage: PipelineStage) {
        self.machine().mark_changed(stage);
    }

    pub fn parameters(&self) -> ErosionParameters {
        *self.params.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one parameter edit; out-of-range values leave the set unchanged.
    pub fn set_parameter(&self, parameter: ErosionParameter) -> Result<(), ConfigurationError> {
        let mut params = self.params.lock().unwrap_or_else(PoisonError::into_inner);
        *params = params.with(parameter)?;
        tracing::debug!(?parameter, "Erosion parameter updated");
        Ok(())
    }

    pub fn topology_params(&self) -> TopologyParams {
        self.topology
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the topology settings; unrepresentable ones are rejected.
    pub fn set_topology_params(&self, topology: TopologyParams) -> Result<(), ConfigurationError> {
        topology.validate()?;
        *self.topology.lock().unwrap_or_else(PoisonError::into_inner) = topology;
        Ok(())
    }

    /// Height field as of the last completed run.
    pub fn height_field(&self) -> HeightField {
        self.height.snapshot()
    }

    pub fn water_field(&self) -> HeightField {
        self.water.water_field()
    }

    pub fn sediment_field(&self) -> HeightField {
        self.thermal.sediment_field()
    }

    /// Displacement published by the last landscape refresh.
    pub fn displacement(&self) -> Option<DisplacementSource> {
        self.displacement
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Generate a fresh terrain from the topology parameters.
    pub async fn run_topology(&self) -> Result<RunOutcome, ErosionError> {
        let Some(_flight) = self.begin("topology") else {
            return Ok(RunOutcome::Skipped);
        };
        let generator = TopologyGenerator::new(self.topology_params());
        self.height
            .upload(&*self.device, generator.generate(&self.layout))?;
        self.mark_changed(PipelineStage::Topology);
        tracing::debug!(seed = generator.params().seed, "Topology generated");
        self.refresh_displacement().await
    }

    /// One hydraulic erosion run.
    pub async fn run_erosion(&self) -> Result<RunOutcome, ErosionError> {
        let Some(_flight) = self.begin("erosion") else {
            return Ok(RunOutcome::Skipped);
        };
        let params = self.parameters();
        if !self.hydraulic.run(&self.height, &params).await?.is_completed() {
            return Ok(RunOutcome::Skipped);
        }
        self.mark_changed(PipelineStage::Erosion);
        self.refresh_after_edit().await
    }

    /// One thermal erosion run.
    pub async fn run_thermal(&self) -> Result<RunOutcome, ErosionError> {
        let Some(_flight) = self.begin("thermal") else {
            return Ok(RunOutcome::Skipped);
        };
        let params = self.parameters();
        if !self.thermal.run(&self.height, &params).await?.is_completed() {
            return Ok(RunOutcome::Skipped);
        }
        self.mark_changed(PipelineStage::Erosion);
        self.refresh_after_edit().await
    }

    /// Smooth the terrain `blur_iterations` times.
    pub async fn run_blur(&self) -> Result<RunOutcome, ErosionError> {
        let Some(_flight) = self.begin("blur") else {
            return Ok(RunOutcome::Skipped);
        };
        let iterations = self.parameters().blur_iterations;
        if !self.blur.run(&self.height, iterations).await?.is_completed() {
            return Ok(RunOutcome::Skipped);
        }
        self.mark_changed(PipelineStage::Erosion);
        self.refresh_after_edit().await
    }

    /// Retrace the water field over the current terrain.
    pub async fn run_water(&self) -> Result<RunOutcome, ErosionError> {
        let Some(_flight) = self.begin("water") else {
            return Ok(RunOutcome::Skipped);
        };
        let params = self.parameters();
        self.water.run(&self.height, &params).await
    }

    /// Refresh range, radius and water for the current terrain.
    pub async fn run_landscape(&self) -> Result<RunOutcome, ErosionError> {
        let Some(_flight) = self.begin("landscape") else {
            return Ok(RunOutcome::Skipped);
        };
        self.landscape().await
    }

    /// Advance one stage. `None` at the last stage or while a run is in flight.
    pub async fn next(&self) -> Result<Option<Transition>, ErosionError> {
        let Some(_flight) = self.begin("next") else {
            return Ok(None);
        };
        let transition = self.machine().advance();
        match transition {
            Some(transition) => self.switch(transition).await.map(Some),
            None => Ok(None),
        }
    }

    /// Go back one stage. `None` at the first stage or while a run is in flight.
    pub async fn previous(&self) -> Result<Option<Transition>, ErosionError> {
        let Some(_flight) = self.begin("previous") else {
            return Ok(None);
        };
        let transition = self.machine().retreat();
        match transition {
            Some(transition) => self.switch(transition).await.map(Some),
            None => Ok(None),
        }
    }

    fn machine(&self) -> MutexGuard<'_, StageMachine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, operation: &'static str) -> Option<FlightGuard<'_>> {
        let flight = self.flight.try_begin();
        if flight.is_none() {
            tracing::trace!(operation, "Pipeline busy, dropping request");
        }
        flight
    }

    async fn switch(&self, transition: Transition) -> Result<Transition, ErosionError> {
        let Transition { from, to, recompute } = transition;
        self.hooks.disable(from);
        self.hooks.hide(from);
        {
            let mut machine = self.machine();
            machine.set_enabled(from, false);
            machine.set_visible(from, false);
            machine.set_visible(to, true);
        }
        self.hooks.show(to);

        if recompute {
            tracing::info!(?from, ?to, "Upstream stage changed, recomputing landscape");
            if let Err(e) = self.landscape().await {
                tracing::error!(?from, ?to, error = %e, "Landscape recompute failed, reverting");
                self.machine().revert(transition);
                self.hooks.hide(to);
                self.hooks.show(from);
                self.hooks.enable(from);
                return Err(e);
            }
        } else {
            tracing::info!(?from, ?to, "Reusing cached landscape");
        }

        self.machine().set_enabled(to, true);
        self.hooks.enable(to);
        Ok(transition)
    }

    /// Range and radius after a terrain edit. In the Erosion stage the water
    /// field is retraced as well, since that stage displays it.
    async fn refresh_after_edit(&self) -> Result<RunOutcome, ErosionError> {
        if self.current_stage() == PipelineStage::Erosion {
            self.landscape().await
        } else {
            self.refresh_displacement().await
        }
    }

    async fn landscape(&self) -> Result<RunOutcome, ErosionError> {
        if !self.refresh_displacement().await?.is_completed() {
            return Ok(RunOutcome::Skipped);
        }
        let params = self.parameters();
        self.water.run(&self.height, &params).await
    }

    async fn refresh_displacement(&self) -> Result<RunOutcome, ErosionError> {
        if !self.range.run(&self.height).await?.is_completed() {
            return Ok(RunOutcome::Skipped);
        }
        let range = self.range.latest();
        let source = self.radius.source(self.height.snapshot(), range);
        tracing::debug!(
            min = source.min,
            max = source.max,
            radius = source.radius,
            "Displacement refreshed"
        );
        *self
            .displacement
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(source);
        Ok(RunOutcome::Completed)
    }
}

impl<D, H> PipelineOrchestrator<D, H>
where
    D: ComputeDevice + 'static,
    H: StageHooks + 'static,
{
    /// Keep hydraulic erosion running in the background while enabled.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_continuous(self: &Arc<Self>, poll_interval: Duration) -> ContinuousRunner {
        let orchestrator = Arc::clone(self);
        ContinuousRunner::spawn(poll_interval, move || {
            let orchestrator = Arc::clone(&orchestrator);
            async move { orchestrator.run_erosion().await }
        })
    }
}
