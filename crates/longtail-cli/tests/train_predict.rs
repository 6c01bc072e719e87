use std::fmt::Write as _;
use std::path::Path;

use clap::Parser;
use longtail_cli::{Cli, Commands, PredictCommand, TrainCommand};

fn write_split(path: &Path, days: usize, offset: usize) {
    let mut text = String::from("datetime,instrument,f0,f1,f2,f3,LABEL0,LABEL1,LABEL2,LABEL3,LABEL4\n");
    for day in 0..days {
        for inst in 0..6 {
            let r = (offset + day) * 6 + inst;
            let signal = ((r * 7 % 13) as f32 - 6.0) / 6.0;
            let noise = ((r * 5 % 11) as f32 - 5.0) / 50.0;
            write!(
                text,
                "2022-03-{:02},SZ{inst:06},{noise},{},{signal},{}",
                1 + offset + day,
                0.5 * noise,
                -noise
            )
            .unwrap();
            for h in 0..5 {
                write!(text, ",{}", 0.1 * signal + 0.01 * h as f32).unwrap();
            }
            text.push('\n');
        }
    }
    std::fs::write(path, text).unwrap();
}

#[test]
fn parses_train_flags() {
    let cli = Cli::try_parse_from([
        "longtail",
        "train",
        "--data-dir",
        "/data",
        "--save-dir",
        "/models/a",
        "--encoder",
        "tcn",
        "--batch-size",
        "32",
        "--contrastive",
        "sampling",
        "--prototypes",
        "8",
    ])
    .unwrap();
    match cli.command {
        Commands::Train(cmd) => {
            assert_eq!(cmd.batch_size, Some(32));
            assert_eq!(cmd.prototypes, Some(8));
            let config = cmd.build_config().unwrap();
            assert_eq!(config.encoder.variant.name(), "tcn");
            assert_eq!(config.memory.unwrap().prototypes, 8);
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn predict_requires_input_and_output() {
    let err = Cli::try_parse_from(["longtail", "predict", "--model-dir", "/models/a"]);
    assert!(err.is_err());
}

#[test]
fn train_then_predict_round_trip() {
    let data = tempfile::tempdir().unwrap();
    write_split(&data.path().join("train.csv"), 5, 0);
    write_split(&data.path().join("valid.csv"), 2, 5);
    write_split(&data.path().join("test.csv"), 2, 7);
    let models = tempfile::tempdir().unwrap();
    let save_dir = models.path().join("run");

    let train = TrainCommand {
        data_dir: data.path().to_path_buf(),
        save_dir: save_dir.clone(),
        encoder: Some("gru".to_string()),
        feature_dim: Some(2),
        hidden_size: Some(4),
        batch_size: Some(6),
        epochs: Some(2),
        seed: Some(3),
        dump_representations: true,
        ..TrainCommand::default()
    };
    train.run().unwrap();
    for file in [
        "config.json",
        "encoder.safetensors",
        "metrics.jsonl",
        "fit_report.json",
        "representations.safetensors",
    ] {
        assert!(save_dir.join(file).is_file(), "missing {file}");
    }

    let output = models.path().join("scores.csv");
    let predict = PredictCommand {
        model_dir: save_dir,
        config: None,
        input: data.path().join("test.csv"),
        output: output.clone(),
    };
    predict.run().unwrap();

    let mut reader = csv::Reader::from_path(&output).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["datetime", "instrument", "score"]);
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 12);
    assert!(rows.iter().all(|r| r[2].parse::<f32>().unwrap().is_finite()));
}
