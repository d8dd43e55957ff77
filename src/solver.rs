//! Newton-Raphson iterations and the time stepping controller.
use crate::behaviour::StiffnessMatrixType;
use crate::error::IntegrationFailure;
use crate::options::{PredictionPolicy, SolverOptions, StiffnessUpdatingPolicy};
use crate::state::{StudyCurrentState, StudyStage};
use crate::study::{Study, StudyStatus};
use itertools::Itertools;
use log::{debug, info, trace, warn};
use mtest_optimize::acceleration::AccelerationAlgorithm;
use nalgebra::linalg::LU;
use nalgebra::{DMatrix, DVector, Dyn};
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// The failure of a time step. The controller recovers from it by sub-stepping.
#[derive(Debug, Clone, PartialEq)]
pub enum StepFailure {
    Integration(IntegrationFailure),
    SingularStiffnessMatrix,
    /// The iteration budget was exhausted. Lists the criteria which were not satisfied.
    NonConvergence { iterations: usize, criteria: Vec<String> },
    /// The behaviour converged but asked for a smaller time step.
    TimeStepRejected { time_step_scaling: f64 },
    /// The state does not hold as many unknowns as the study.
    InconsistentUnknowns { study: usize, state: usize },
}

impl StepFailure {
    fn time_step_scaling(&self) -> Option<f64> {
        match self {
            StepFailure::Integration(failure) => failure.time_step_scaling(),
            StepFailure::TimeStepRejected { time_step_scaling } => Some(*time_step_scaling),
            _ => None,
        }
    }
}

impl Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            StepFailure::Integration(failure) => write!(f, "{failure}"),
            StepFailure::SingularStiffnessMatrix => write!(f, "the stiffness matrix is singular"),
            StepFailure::NonConvergence { iterations, criteria } => {
                write!(f, "no convergence after {iterations} iterations")?;
                if !criteria.is_empty() {
                    write!(f, ": {}", criteria.iter().join("; "))?;
                }
                Ok(())
            }
            StepFailure::TimeStepRejected { time_step_scaling } => {
                write!(
                    f,
                    "time step rejected by the behaviour (proposed scaling factor {time_step_scaling})"
                )
            }
            StepFailure::InconsistentUnknowns { study, state } => {
                write!(f, "the study has {study} unknowns but the state holds {state}")
            }
        }
    }
}

impl Error for StepFailure {}

impl From<IntegrationFailure> for StepFailure {
    fn from(failure: IntegrationFailure) -> Self {
        StepFailure::Integration(failure)
    }
}

/// A converged time step.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StepOutcome {
    pub iterations: usize,
    /// Time step scaling factor proposed by the behaviours at the last iteration.
    pub time_step_scaling: f64,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    pub status: StudyStatus,
    pub diagnostic: String,
}

/// Drives a [`Study`] through a list of times.
pub struct NonlinearSolver<'a> {
    options: &'a SolverOptions,
    acceleration: Option<&'a mut dyn AccelerationAlgorithm>,
    k: DMatrix<f64>,
    r: DVector<f64>,
    lu: Option<LU<f64, Dyn, Dyn>>,
}

impl<'a> NonlinearSolver<'a> {
    pub fn new(options: &'a SolverOptions, acceleration: Option<&'a mut dyn AccelerationAlgorithm>) -> Self {
        Self {
            options,
            acceleration,
            k: DMatrix::zeros(0, 0),
            r: DVector::zeros(0),
            lu: None,
        }
    }

    fn solve(&self) -> Result<DVector<f64>, StepFailure> {
        self.lu
            .as_ref()
            .and_then(|lu| lu.solve(&self.r))
            .filter(|du| du.iter().all(|v| v.is_finite()))
            .ok_or(StepFailure::SingularStiffnessMatrix)
    }

    /// Solves the time step `[t, t + dt]`.
    ///
    /// On failure, the trial state is left as is: the caller is responsible for reverting it.
    pub fn iterate<S>(
        &mut self,
        study: &S,
        scs: &mut StudyCurrentState,
        t: f64,
        dt: f64,
    ) -> Result<StepOutcome, StepFailure>
    where
        S: Study + ?Sized,
    {
        let options = self.options;
        let n = study.number_of_unknowns();
        if scs.number_of_unknowns() != n {
            return Err(StepFailure::InconsistentUnknowns {
                study: n,
                state: scs.number_of_unknowns(),
            });
        }
        if self.k.nrows() != n {
            self.k = DMatrix::zeros(n, n);
            self.r = DVector::zeros(n);
            self.lu = None;
        }
        let ueps = options.driving_variable_epsilon();
        let seps = options.thermodynamic_force_epsilon();
        let max_iterations = options.maximum_iterations();
        let prediction = options.prediction_policy();
        let ktype = options
            .stiffness_matrix_type()
            .unwrap_or(StiffnessMatrixType::ConsistentTangentOperator);

        study.prepare(scs, t, dt);
        if let Some(acceleration) = self.acceleration.as_deref_mut() {
            acceleration.pre_execution_tasks();
        }

        scs.stage = StudyStage::Predicting;
        match prediction {
            PredictionPolicy::NoPrediction => {}
            PredictionPolicy::LinearPrediction => study.make_linear_prediction(scs, dt),
            policy => {
                if let Some(smt) = policy.stiffness_matrix_type() {
                    match study.compute_prediction_stiffness_and_residual(scs, &mut self.k, &mut self.r, t, dt, smt) {
                        Ok(()) => {
                            self.lu = Some(self.k.clone().lu());
                            match self.solve() {
                                Ok(du) => scs.u1 -= &du,
                                Err(failure) => warn!("Prediction failed ({failure}), prediction skipped"),
                            }
                            // The prediction factorisation is not the stiffness matrix
                            self.lu = None;
                        }
                        Err(failure) => {
                            warn!("Computation of the prediction operator failed ({failure}), prediction skipped");
                        }
                    }
                }
            }
        }

        scs.stage = StudyStage::Iterating;
        let policy = options.stiffness_updating_policy();
        let mut iteration = 0;
        let mut converged = false;
        let mut time_step_scaling = f64::INFINITY;
        // Last three error norms, newest last
        let mut errors: Vec<f64> = Vec::with_capacity(3);
        while !converged && iteration != max_iterations {
            iteration += 1;
            scs.iterations += 1;
            scs.u10.copy_from(&scs.u1);
            let reuse_stiffness = match policy {
                StiffnessUpdatingPolicy::Constant => self.lu.is_some(),
                StiffnessUpdatingPolicy::ConstantPerPeriod => self.lu.is_some() && iteration > 1,
                StiffnessUpdatingPolicy::UpdatedEachIteration => false,
            };
            let smt = if reuse_stiffness {
                StiffnessMatrixType::NoStiffness
            } else {
                ktype
            };
            time_step_scaling =
                study.compute_stiffness_matrix_and_residual(scs, &mut self.k, &mut self.r, t, dt, smt)?;
            trace!("Residual at iteration {}: {}", iteration, self.r.transpose());
            if !reuse_stiffness {
                trace!("Stiffness matrix at iteration {}: {}", iteration, self.k);
                self.lu = Some(self.k.clone().lu());
            }
            let du = self.solve()?;
            scs.u1 -= &du;

            let check = study.check_convergence(scs, &du, &self.r, ueps, seps, t, dt);
            debug!(
                "Iteration {}: |du| = {:e}, |r| = {:e}",
                iteration, check.increment_norm, check.residual_norm
            );
            converged = check.converged && (prediction != PredictionPolicy::NoPrediction || iteration > 1);

            if errors.len() == 3 {
                errors.remove(0);
            }
            errors.push(study.error_norm(&du));

            if !converged {
                if iteration == max_iterations {
                    let criteria = study.failed_criteria_diagnostic(scs, &du, &self.r, ueps, seps, t, dt);
                    return Err(StepFailure::NonConvergence {
                        iterations: iteration,
                        criteria,
                    });
                }
                if let Some(acceleration) = self.acceleration.as_deref_mut() {
                    acceleration.execute(&mut scs.u1, &du, &self.r, ueps, seps, iteration);
                }
            }
        }

        if let [e2, e1, e0] = errors[..] {
            if e0 > 0.0 && e1 > 0.0 && e2 > 0.0 && e1 != e2 {
                debug!("Convergence order estimate: {:.3}", (e0 / e1).ln() / (e1 / e2).ln());
            }
        }
        Ok(StepOutcome {
            iterations: iteration,
            time_step_scaling,
        })
    }

    /// Runs the study over the consecutive periods defined by `times`.
    pub fn execute<S>(&mut self, study: &mut S, scs: &mut StudyCurrentState, times: &[f64]) -> SolverOutcome
    where
        S: Study + ?Sized,
    {
        let options = self.options;
        let dynamic = options.dynamic_time_step_scaling();
        let min_factor = options.minimal_time_step_scaling_factor();
        let max_factor = options.maximal_time_step_scaling_factor();
        let max_sub_steps = options.maximum_sub_steps();
        if scs.number_of_unknowns() != study.number_of_unknowns() {
            scs.stage = StudyStage::Diverged;
            let failure = StepFailure::InconsistentUnknowns {
                study: study.number_of_unknowns(),
                state: scs.number_of_unknowns(),
            };
            return SolverOutcome {
                status: StudyStatus::Divergence,
                diagnostic: failure.to_string(),
            };
        }

        for (ti, te) in times.iter().copied().tuple_windows() {
            let t_eps = (te - ti) * 100.0 * f64::EPSILON;
            let mut t = ti;
            let mut dt = te - ti;
            let mut sub_steps = 0;
            info!("Period [{ti}, {te}]");
            while te - t > t_eps {
                if let Some(max_dt) = options.maximal_time_step() {
                    dt = dt.min(max_dt);
                }
                if t + dt > te - t_eps {
                    dt = te - t;
                }
                let min_dt = options.minimal_time_step().unwrap_or(0.0);
                if dt <= 0.0 || dt < min_dt {
                    scs.stage = StudyStage::Diverged;
                    return SolverOutcome {
                        status: StudyStatus::Divergence,
                        diagnostic: format!(
                            "time step {dt:e} below the minimal time step at time {t} (period {})",
                            scs.period
                        ),
                    };
                }
                study.treat_events(t, t_eps);

                let result = match self.iterate(&*study, scs, t, dt) {
                    Ok(outcome) if dynamic && outcome.time_step_scaling < 1.0 - 10.0 * f64::EPSILON => {
                        Err(StepFailure::TimeStepRejected {
                            time_step_scaling: outcome.time_step_scaling,
                        })
                    }
                    result => result,
                };

                match result {
                    Ok(outcome) => {
                        study.post_convergence(scs, t, dt);
                        if let Some(acceleration) = self.acceleration.as_deref_mut() {
                            acceleration.post_execution_tasks();
                        }
                        debug!("Converged in {} iterations at time {}", outcome.iterations, t + dt);
                        t += dt;
                        if dynamic {
                            let proposal = if outcome.iterations <= options.maximum_iterations() / 2 {
                                max_factor
                            } else {
                                min_factor
                            };
                            let factor = proposal.min(outcome.time_step_scaling).max(min_factor);
                            if factor != 1.0 {
                                info!("Scaling time step by a factor {factor}");
                            }
                            dt *= factor;
                        }
                    }
                    Err(failure) => {
                        sub_steps += 1;
                        scs.sub_steps += 1;
                        warn!("Time step [{t}, {}] failed: {failure}", t + dt);
                        if sub_steps == max_sub_steps {
                            scs.stage = StudyStage::Diverged;
                            let status = match failure {
                                StepFailure::NonConvergence { .. } => StudyStatus::NonConvergence,
                                _ => StudyStatus::Divergence,
                            };
                            return SolverOutcome {
                                status,
                                diagnostic: format!(
                                    "maximum number of sub-steps reached at time {t} (period {}): {failure}",
                                    scs.period
                                ),
                            };
                        }
                        scs.revert();
                        let factor = if dynamic {
                            let proposal = match failure {
                                // A converged step: the proposal of the behaviour is followed
                                StepFailure::TimeStepRejected { time_step_scaling } => time_step_scaling,
                                _ => failure.time_step_scaling().map_or(0.5, |rdt| rdt.min(0.5)),
                            };
                            proposal.max(min_factor)
                        } else {
                            0.5
                        };
                        info!("Reducing time step by a factor {factor}");
                        dt *= factor;
                    }
                }
            }
        }
        scs.stage = StudyStage::Finished;
        SolverOutcome {
            status: StudyStatus::Success,
            diagnostic: String::new(),
        }
    }
}
