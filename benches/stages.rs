use criterion::Criterion;
use reverse_radex::{
    CollisionPartner, EnsembleMcmc, FixedParameters, ForwardModel, GridSearch, IntensityUnit,
    LineCatalogue, LineIntensities, ModelEvaluationError, ModelLine, ModelOutput,
    ModelParameters, ObservedSpectrum, ParameterSpec, PhysicalParameter, Pipeline,
    PipelineConfig, TrustRegionFit,
};
use std::hint::black_box;

const N_LINES: usize = 20;

/// Smooth analytic stand-in for a radiative-transfer model
struct PowerLawModel;

impl ForwardModel for PowerLawModel {
    fn evaluate(&self, p: &ModelParameters) -> Result<ModelOutput, ModelEvaluationError> {
        let get = |kind| {
            p.get(kind)
                .ok_or_else(|| ModelEvaluationError::Failed(format!("{kind} is not set")))
        };
        let tkin = get(PhysicalParameter::KineticTemperature)?;
        let cd = get(PhysicalParameter::ColumnDensity)?;
        let h2 = get(PhysicalParameter::Density(CollisionPartner::H2))?;
        Ok((0..N_LINES)
            .map(|i| ModelLine {
                line_id: format!("{}-{}", i + 1, i),
                frequency: frequency(i),
                intensities: LineIntensities::uniform(intensity(tkin, cd, h2, i)),
            })
            .collect())
    }
}

fn frequency(i: usize) -> f64 {
    115.27 * (i + 1) as f64
}

fn intensity(tkin: f64, cd: f64, h2: f64, i: usize) -> f64 {
    let j = (i + 1) as f64;
    (cd / 1e14).powf(0.8) * (tkin / 50.0).powf(0.3 * j.sqrt()) / (1.0 + 1e4 / h2 * j)
}

fn problem() -> (ObservedSpectrum, LineCatalogue, Vec<ParameterSpec>) {
    let specs = vec![
        ParameterSpec::fit(PhysicalParameter::KineticTemperature, 10.0, 500.0),
        ParameterSpec::fit(PhysicalParameter::ColumnDensity, 1e12, 1e18),
        ParameterSpec::fit(PhysicalParameter::Density(CollisionPartner::H2), 1e2, 1e7),
    ];
    let observed_lines: Vec<_> = (0..N_LINES).step_by(4).collect();
    let observed = ObservedSpectrum::new(
        observed_lines.iter().map(|&i| frequency(i)).collect(),
        observed_lines
            .iter()
            .map(|&i| intensity(80.0, 3e15, 1e5, i))
            .collect(),
        None,
        IntensityUnit::Temperature,
    )
    .expect("valid spectrum");
    let catalogue = LineCatalogue::new((0..N_LINES).map(frequency).collect());
    (observed, catalogue, specs)
}

fn pipeline<'a>(
    observed: &'a ObservedSpectrum,
    catalogue: &LineCatalogue,
    specs: &[ParameterSpec],
) -> Pipeline<'a, PowerLawModel> {
    Pipeline::new(
        &PowerLawModel,
        observed,
        catalogue,
        specs,
        FixedParameters::new("bench.dat"),
        PipelineConfig::default(),
    )
    .expect("valid problem")
}

pub fn bench_grid_search(c: &mut Criterion) {
    let (observed, catalogue, specs) = problem();
    let pipeline = pipeline(&observed, &catalogue, &specs);
    let objective = pipeline.objective();
    let grid = GridSearch::default();
    c.bench_function("Grid search: 3 parameters", |b| {
        b.iter(|| grid.run(black_box(&objective)).unwrap());
    });
}

pub fn bench_least_squares(c: &mut Criterion) {
    let (observed, catalogue, specs) = problem();
    let pipeline = pipeline(&observed, &catalogue, &specs);
    let objective = pipeline.objective();
    let fit = TrustRegionFit::default();
    let x0 = [2.0, 14.0, 4.0];
    c.bench_function("Least squares: 3 parameters", |b| {
        b.iter(|| fit.run(black_box(&objective), black_box(&x0)));
    });
}

pub fn bench_mcmc(c: &mut Criterion) {
    let (observed, catalogue, specs) = problem();
    let pipeline = pipeline(&observed, &catalogue, &specs);
    let objective = pipeline.objective();
    let mcmc = EnsembleMcmc {
        n_steps: 100,
        ..EnsembleMcmc::default().with_seed(0)
    };
    let x0 = [80f64.log10(), 3e15f64.log10(), 5.0];
    c.bench_function("Ensemble MCMC: 35 walkers, 100 steps", |b| {
        b.iter(|| mcmc.run(black_box(&objective), black_box(&x0)).unwrap());
    });
}
