use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};

use ferrite_kd::data::synthetic;
use ferrite_kd::distill::KdLossKind;
use ferrite_kd::loss::LossOutput;
use ferrite_kd::{
    ActivationFunction, CrossEntropyLoss, DataLoader, DistillConfig, Distiller, KdLoss, Matrix,
    Mode, Model, Network, NetworkSpec, Sgd, SoftTarget, StateDict, TrainOptions,
};

fn distiller<L: KdLoss>(config: DistillConfig, method: L) -> Distiller<L> {
    let (train, val) = synthetic::blobs(300, 4, 3, 3.0, 7).unwrap().split(0.2, 7).unwrap();
    let teacher = Network::from_spec(
        &NetworkSpec::mlp("teacher", &[4, 32, 3], ActivationFunction::ReLU).with_seed(1),
    ).unwrap();
    let student = Network::from_spec(
        &NetworkSpec::mlp("student", &[4, 4, 3], ActivationFunction::ReLU).with_seed(2),
    ).unwrap();
    Distiller::new(
        teacher,
        student,
        DataLoader::new(train, 16).unwrap().shuffle(7),
        DataLoader::new(val, 32).unwrap(),
        Box::new(Sgd::new(0.05).momentum(0.9)),
        Box::new(Sgd::new(0.05).momentum(0.9)),
        config,
        method,
    )
    .unwrap()
}

#[test]
fn teacher_then_student_reach_high_accuracy() {
    let dir = tempfile::tempdir().unwrap();
    let mut kd = distiller(DistillConfig::default(), SoftTarget);

    let teacher_report = kd
        .train_teacher(&TrainOptions::new(8, dir.path().join("teacher.safetensors")))
        .unwrap();
    assert_eq!(teacher_report.epochs_run, 8);
    assert!(kd.evaluate(true).unwrap() > 0.9);

    let student_report = kd
        .train_student(&TrainOptions::new(8, dir.path().join("student.safetensors")))
        .unwrap();
    assert_eq!(student_report.loss_history.len(), 8);
    assert!(kd.evaluate(false).unwrap() > 0.8);
}

#[test]
fn model_ends_on_its_best_epoch_and_matches_the_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models/teacher.safetensors");
    let mut kd = distiller(DistillConfig::default(), SoftTarget);

    let report = kd.train_teacher(&TrainOptions::new(5, &path)).unwrap();

    let best = report.accuracy_history.iter().cloned().fold(0.0, f64::max);
    assert_eq!(report.best_accuracy, best);
    let first_best = report.accuracy_history.iter().position(|&a| a == best).unwrap() + 1;
    assert_eq!(report.best_epoch, Some(first_best));

    assert_eq!(report.saved_to.as_deref(), Some(path.as_path()));
    assert_eq!(StateDict::load(&path).unwrap(), kd.teacher_model.state_dict());
    assert!(report.plot.unwrap().ends_with("teacher_losses.svg"));
}

#[test]
fn kl_divergence_variant_trains_the_student() {
    let dir = tempfile::tempdir().unwrap();
    let config = DistillConfig { loss: KdLossKind::KlDiv, temperature: 4.0, distil_weight: 0.7 };
    let mut kd = distiller(config, SoftTarget);
    let options = |name: &str| TrainOptions::new(6, dir.path().join(name)).plot_losses(false);

    kd.train_teacher(&options("t.safetensors")).unwrap();
    let report = kd.train_student(&options("s.safetensors")).unwrap();
    assert!(report.best_accuracy > 0.8);
    assert!(report.plot.is_none());
}

#[test]
fn evaluate_does_not_touch_the_live_model() {
    let mut kd = distiller(DistillConfig::default(), SoftTarget);
    kd.student_model.set_mode(Mode::Train);
    let before = kd.student_model.state_dict();
    kd.evaluate(false).unwrap();
    assert_eq!(kd.student_model.mode(), Mode::Train);
    assert_eq!(kd.student_model.state_dict(), before);
}

#[test]
fn parameter_counts_cover_both_models() {
    let kd = distiller(DistillConfig::default(), SoftTarget);
    let counts = kd.get_parameters();
    assert_eq!(counts.teacher, 4 * 32 + 32 + 32 * 3 + 3);
    assert_eq!(counts.student, 4 * 4 + 4 + 4 * 3 + 3);
}

#[test]
fn progress_channel_gets_one_message_per_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::channel();
    let mut kd = distiller(DistillConfig::default(), SoftTarget);
    let options = TrainOptions::new(3, dir.path().join("t.safetensors"))
        .plot_losses(false)
        .with_progress(tx);
    kd.train_teacher(&options).unwrap();
    drop(options);

    let stats: Vec<_> = rx.iter().collect();
    assert_eq!(stats.iter().map(|s| s.epoch).collect::<Vec<_>>(), [1, 2, 3]);
    assert!(stats.iter().all(|s| s.run == "teacher" && s.total_epochs == 3));
}

#[test]
fn raised_stop_flag_keeps_initial_weights() {
    let mut kd = distiller(DistillConfig::default(), SoftTarget);
    let initial = kd.teacher_model.state_dict();
    let options = TrainOptions::new(5, "unused.safetensors")
        .save_model(false)
        .plot_losses(false)
        .with_stop_flag(Arc::new(AtomicBool::new(true)));

    let report = kd.train_teacher(&options).unwrap();
    assert_eq!(report.epochs_run, 0);
    assert_eq!(report.best_epoch, None);
    assert_eq!(kd.teacher_model.state_dict(), initial);
}

#[test]
fn dropped_receiver_stops_after_one_epoch_and_still_saves() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("teacher.safetensors");
    let (tx, rx) = mpsc::channel();
    drop(rx);
    let mut kd = distiller(DistillConfig::default(), SoftTarget);
    let options = TrainOptions::new(5, &path).with_progress(tx);

    let report = kd.train_teacher(&options).unwrap();
    assert_eq!(report.epochs_run, 1);
    assert_eq!(report.accuracy_history.len(), 1);
    assert_eq!(report.saved_to.as_deref(), Some(path.as_path()));
    assert_eq!(StateDict::load(&path).unwrap(), kd.teacher_model.state_dict());
    let plot = report.plot.unwrap();
    assert_eq!(plot, dir.path().join("teacher_losses.svg"));
    assert!(std::fs::read_to_string(plot).unwrap().starts_with("<svg"));
}

#[test]
fn stop_flag_still_saves_the_restored_weights() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("student.safetensors");
    let mut kd = distiller(DistillConfig::default(), SoftTarget);
    let initial = kd.student_model.state_dict();
    let options = TrainOptions::new(4, &path).with_stop_flag(Arc::new(AtomicBool::new(true)));

    let report = kd.train_student(&options).unwrap();
    assert_eq!(report.epochs_run, 0);
    assert_eq!(StateDict::load(&path).unwrap(), initial);
    assert_eq!(kd.student_model.state_dict(), initial);
    assert!(report.plot.unwrap().exists());
}

/// A method that ignores the teacher, to check that the loops only go
/// through `KdLoss`.
struct LabelsOnly;

impl KdLoss for LabelsOnly {
    fn calculate_kd_loss(
        &self,
        student_logits: &Matrix,
        _teacher_logits: &Matrix,
        labels: &[usize],
        _config: &DistillConfig,
    ) -> ferrite_kd::Result<LossOutput> {
        CrossEntropyLoss::forward(student_logits, labels)
    }
}

#[test]
fn custom_methods_plug_into_the_student_loop() {
    let dir = tempfile::tempdir().unwrap();
    let mut kd = distiller(DistillConfig::default(), LabelsOnly);
    let report = kd
        .train_student(&TrainOptions::new(4, dir.path().join("s.safetensors")).plot_losses(false))
        .unwrap();
    assert_eq!(report.epochs_run, 4);
    assert!(report.loss_history.last().unwrap() < report.loss_history.losses[0]);
}
