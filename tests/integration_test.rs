use std::fs;
use std::process::Command;

use assert_cmd::assert::OutputAssertExt;
use assert_cmd::cargo;
use predicates::prelude::*;
use tempfile::tempdir;

use mas_splitter::adapters::{AdapterConfig, AdapterLibrary};
use mas_splitter::io::MemorySplitSink;
use mas_splitter::reverse_complement;
use mas_splitter::splitter::{process_batch, Classification, ReadRecord, Splitter};
use mas_splitter::stats::SplitStats;

const SIG: &str = "TCTACACGACGCTCTTCCGATCT";
const PRIMER: &str = "GTACTCTGCGTTGATACCACTGCTTA";
const SIG5: &str = "CTACACGACGCTCTTCCGATCT";
const ANCHOR: &str = "ATGGG";
const BC7: &str = "ACTCGTAACGTTGGCT";
const UMI: &str = "ACGTACGTAC";

const ADAPTERS_JSON: &str = r#"{"adapters": [
    {"name": "BC7", "sequence": "ACTCGTAACGTTGGCT"},
    {"name": "BC9", "sequence": "TGGACTTGACGTCAGA", "max_edits": 1}
]}"#;

/// Two concatenated transcripts: the first complete (signature, UMI, anchor,
/// insert, barcode), the second with an intact signature but no barcode.
fn example_read() -> String {
    format!(
        "{SIG}{UMI}{ANCHOR}{}{BC7}{PRIMER}{SIG5}{}",
        "AAC".repeat(14),
        "AAC".repeat(13)
    )
}

fn library() -> AdapterLibrary {
    AdapterLibrary::new(&[
        AdapterConfig {
            name: "BC7".into(),
            sequence: BC7.into(),
            max_edits: 2,
        },
        AdapterConfig {
            name: "BC9".into(),
            sequence: "TGGACTTGACGTCAGA".into(),
            max_edits: 1,
        },
    ])
    .unwrap()
}

#[test]
fn test_split_pipeline_library_level() {
    let good = example_read();
    let rc = reverse_complement(good.as_bytes()).unwrap();

    let batch = vec![
        ReadRecord {
            id: "R1".into(),
            seq: good.clone().into_bytes(),
            qual: vec![b'I'; good.len()],
            pass_number: None,
        },
        ReadRecord {
            id: "R2".into(),
            seq: vec![b'A'; 120],
            qual: vec![b'I'; 120],
            pass_number: None,
        },
        // same molecule sequenced in the other direction
        ReadRecord {
            id: "R3".into(),
            seq: rc,
            qual: vec![b'I'; good.len()],
            pass_number: None,
        },
    ];

    let splitter = Splitter::new(library());
    let mut sink = MemorySplitSink::default();
    let mut totals = SplitStats::default();
    process_batch(&batch, &splitter, &mut sink, &mut totals).unwrap();

    assert_eq!(totals.assigned, 2);
    assert_eq!(totals.no_barcode, 2);
    assert_eq!(totals.split_failed, 1);
    assert_eq!(totals.total_segments(), 4);

    let assigned = sink.with_classification(Classification::Assigned);
    let mut ids: Vec<&str> = assigned.iter().map(|r| r.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, [format!("R1|0|BC7|{UMI}"), format!("R3|0|BC7|{UMI}")]);
    for rec in assigned {
        assert_eq!(rec.seq, "AAC".repeat(14).into_bytes());
        assert_eq!(rec.seq.len(), rec.qual.len());
    }
}

#[test]
fn test_split_cli_writes_streams_and_stats() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let adapters = tmp.path().join("adapters.json");
    fs::write(&adapters, ADAPTERS_JSON)?;

    let good = example_read();
    let fastq = tmp.path().join("reads.fastq");
    fs::write(
        &fastq,
        format!(
            "@R1\n{good}\n+\n{}\n@R2\n{}\n+\n{}\n",
            "I".repeat(good.len()),
            "A".repeat(120),
            "I".repeat(120)
        ),
    )?;

    let mut cmd = Command::new(cargo::cargo_bin!(env!("CARGO_PKG_NAME")));
    cmd.arg("split")
        .arg("-i")
        .arg(&fastq)
        .arg("-a")
        .arg(&adapters)
        .arg("-v")
        .arg(tmp.path())
        .arg("-n")
        .arg(tmp.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("reads.fastq\t2\t1\t0\t1\t0\t1\t0\t0"));

    let assigned = fs::read_to_string(tmp.path().join("reads.BCassigned.tsv"))?;
    let expected_insert = "AAC".repeat(14);
    assert_eq!(
        assigned,
        format!(
            "R1|0|BC7|{UMI}\t{expected_insert}\t{}\n",
            "I".repeat(expected_insert.len())
        )
    );

    let no_bc = fs::read_to_string(tmp.path().join("reads.noBC.tsv"))?;
    assert!(no_bc.starts_with("R1|1|noBC\t"));
    let err = fs::read_to_string(tmp.path().join("reads.err.tsv"))?;
    assert!(err.starts_with("R2|Error\t"));

    let stats: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(tmp.path().join("reads.stat.json"))?)?;
    assert_eq!(stats["BC_assigned"], 1);
    assert_eq!(stats["No_BC"], 1);
    assert_eq!(stats["Split_failed"], 1);
    assert_eq!(stats["5end_deg"], 0);

    Ok(())
}

#[test]
fn test_split_cli_min_passes_filter() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let adapters = tmp.path().join("adapters.json");
    fs::write(&adapters, ADAPTERS_JSON)?;

    let good = example_read();
    let qual = "I".repeat(good.len());
    let fastq = tmp.path().join("reads.fastq");
    // pass numbers ride on the id, the way the upstream extractor writes them
    fs::write(
        &fastq,
        format!("@R1|9\n{good}\n+\n{qual}\n@R2|2\n{good}\n+\n{qual}\n"),
    )?;

    let mut cmd = Command::new(cargo::cargo_bin!(env!("CARGO_PKG_NAME")));
    cmd.arg("split")
        .arg("-i")
        .arg(&fastq)
        .arg("-a")
        .arg(&adapters)
        .arg("-v")
        .arg(tmp.path())
        .arg("-n")
        .arg(tmp.path())
        .arg("--min-passes")
        .arg("3");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("reads.fastq\t2\t1\t0\t1\t0\t0\t0\t1"));

    let low_pass = fs::read_to_string(tmp.path().join("reads.lowpass.tsv"))?;
    assert!(low_pass.starts_with("R2|2\t"));

    let assigned = fs::read_to_string(tmp.path().join("reads.BCassigned.tsv"))?;
    assert!(assigned.starts_with(&format!("R1|9|0|BC7|{UMI}\t")));

    Ok(())
}

#[test]
fn test_recall_cli_emits_candidates_and_cases() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempdir()?;
    let adapters = tmp.path().join("adapters.json");
    fs::write(&adapters, ADAPTERS_JSON)?;

    // three contiguous segments of one parent; the last hides a barcode and
    // the combined length is 260, so the whole queue is a candidate
    let with_bc = format!("{}{}", BC7, "A".repeat(84));
    let sorted = tmp.path().join("split.sorted.tsv");
    fs::write(
        &sorted,
        format!(
            "R1|3|noBC\t{}\t{}\nR1|4|Degraded\t{}\t{}\nR1|5|Degraded\t{}\t{}\nR9|0|Degraded\t{}\t{}\n",
            "A".repeat(100),
            "I".repeat(100),
            "A".repeat(60),
            "I".repeat(60),
            with_bc,
            "I".repeat(100),
            "A".repeat(30),
            "I".repeat(30),
        ),
    )?;

    let mut cmd = Command::new(cargo::cargo_bin!(env!("CARGO_PKG_NAME")));
    cmd.arg("recall")
        .arg("-i")
        .arg(&sorted)
        .arg("-a")
        .arg(&adapters)
        .arg("-c")
        .arg(tmp.path())
        .arg("-n")
        .arg(tmp.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("split.sorted.tsv\t4\t1\t0"));

    let candidates = fs::read_to_string(tmp.path().join("candidate_list.tsv"))?;
    let lines: Vec<&str> = candidates.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("R1|3|noBC\t"));
    assert!(lines[1].starts_with("R1|4|Degraded\t"));
    assert!(lines[2].starts_with("R1|5|BC7_falseSplit\t"));

    // the orphan continuation of R9 was discarded
    let discarded = fs::read_to_string(tmp.path().join("not_false_split_candidate.tsv"))?;
    assert!(discarded.starts_with("R9|0|Degraded\t"));

    let cases: serde_json::Value = serde_json::from_str(&fs::read_to_string(
        tmp.path().join("false_split_detect_cases.json"),
    )?)?;
    assert_eq!(cases["Case 5"], 1);
    assert_eq!(cases["Case 7"], 1);
    assert_eq!(cases["Case 2"], 1);
    assert_eq!(cases["Case 1"], 0);

    Ok(())
}
