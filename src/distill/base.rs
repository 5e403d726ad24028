//! Teacher/student training loops shared by every distillation method.
//!
//! A method only decides how the student is scored against the teacher by
//! implementing [`KdLoss`]; [`Distiller`] owns the models, loaders and
//! optimizers and runs the loops around it.

use tracing::info;

use crate::data::loader::DataLoader;
use crate::distill::config::DistillConfig;
use crate::error::Result;
use crate::loss::{CrossEntropyLoss, LossOutput};
use crate::math::matrix::Matrix;
use crate::network::model::Trainable;
use crate::network::network::Network;
use crate::optim::optimizer::Optimizer;
use crate::train::eval::{count_correct, evaluate_accuracy};
use crate::train::loop_fn::{run_epochs, train_supervised, BatchOutcome, TrainingReport};
use crate::train::train_options::TrainOptions;

/// The distillation objective: scores student logits against teacher logits
/// and the true labels, returning the loss and its gradient w.r.t. the
/// student logits.
pub trait KdLoss {
    fn calculate_kd_loss(
        &self,
        student_logits: &Matrix,
        teacher_logits: &Matrix,
        labels: &[usize],
        config: &DistillConfig,
    ) -> Result<LossOutput>;
}

/// Parameter counts of both networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterCounts {
    pub teacher: usize,
    pub student: usize,
}

/// Teacher/student pair with their data and optimizers.
pub struct Distiller<L, T = Network, S = Network> {
    pub teacher_model: T,
    pub student_model: S,
    pub train_loader: DataLoader,
    pub val_loader: DataLoader,
    pub optimizer_teacher: Box<dyn Optimizer>,
    pub optimizer_student: Box<dyn Optimizer>,
    pub config: DistillConfig,
    pub method: L,
}

impl<L, T, S> Distiller<L, T, S>
where
    L: KdLoss,
    T: Trainable + Clone,
    S: Trainable + Clone,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        teacher_model: T,
        student_model: S,
        train_loader: DataLoader,
        val_loader: DataLoader,
        optimizer_teacher: Box<dyn Optimizer>,
        optimizer_student: Box<dyn Optimizer>,
        config: DistillConfig,
        method: L,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Distiller {
            teacher_model,
            student_model,
            train_loader,
            val_loader,
            optimizer_teacher,
            optimizer_student,
            config,
            method,
        })
    }

    /// Trains the teacher alone with cross-entropy on the true labels.
    ///
    /// Afterwards the teacher holds the weights of its best-accuracy epoch.
    pub fn train_teacher(&mut self, options: &TrainOptions) -> Result<TrainingReport> {
        info!("Training teacher...");
        train_supervised(
            "teacher",
            &mut self.teacher_model,
            self.optimizer_teacher.as_mut(),
            &CrossEntropyLoss,
            &self.train_loader,
            options,
        )
    }

    /// Trains the student against the (frozen, eval-mode) teacher using the
    /// method's `calculate_kd_loss`.
    ///
    /// Afterwards the student holds the weights of its best-accuracy epoch.
    pub fn train_student(&mut self, options: &TrainOptions) -> Result<TrainingReport> {
        let Distiller {
            teacher_model,
            student_model,
            train_loader,
            optimizer_student,
            config,
            method,
            ..
        } = self;

        teacher_model.eval();
        student_model.train();
        info!("Training student...");

        run_epochs("student", student_model, train_loader, options, |student, batch| {
            let student_out = student.forward(&batch.inputs)?;
            let teacher_out = teacher_model.forward(&batch.inputs)?;

            let loss = method.calculate_kd_loss(&student_out, &teacher_out, &batch.labels, config)?;
            let correct = count_correct(&student_out, &batch.labels);

            optimizer_student.zero_grad(student);
            student.backward(&loss.grad)?;
            optimizer_student.step(student)?;

            Ok(BatchOutcome { loss: loss.value, correct })
        })
    }

    /// Delegates to the method's objective with this distiller's config.
    pub fn calculate_kd_loss(
        &self,
        student_logits: &Matrix,
        teacher_logits: &Matrix,
        labels: &[usize],
    ) -> Result<LossOutput> {
        self.method.calculate_kd_loss(student_logits, teacher_logits, labels, &self.config)
    }

    /// Accuracy on the validation loader of a copy of the teacher (or student).
    ///
    /// The live model's mode and caches are left untouched.
    pub fn evaluate(&self, teacher: bool) -> Result<f64> {
        let accuracy = if teacher {
            evaluate_accuracy(&mut self.teacher_model.clone(), &self.val_loader)?
        } else {
            evaluate_accuracy(&mut self.student_model.clone(), &self.val_loader)?
        };
        info!(model = if teacher { "teacher" } else { "student" }, "Accuracy: {accuracy}");
        Ok(accuracy)
    }

    pub fn get_parameters(&self) -> ParameterCounts {
        let counts = ParameterCounts {
            teacher: self.teacher_model.num_parameters(),
            student: self.student_model.num_parameters(),
        };
        info!("Total parameters for the teacher network are: {}", counts.teacher);
        info!("Total parameters for the student network are: {}", counts.student);
        counts
    }
}
