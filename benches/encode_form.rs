//! Benchmark: build, encode, frame and reload the built-in rating sheets, and
//! validate a batch of records against the student policy.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use omrscan::{FormDefinition, RatingSheet, RecordValidator};

fn bench_forms(c: &mut Criterion) {
    let sheets = [("instructor", RatingSheet::instructor()), ("student", RatingSheet::student())];
    for (name, sheet) in &sheets {
        c.bench_function(&format!("build_{}", name), |b| {
            b.iter(|| black_box(sheet.layout().expect("layout")))
        });

        let def = sheet.layout().expect("layout").definition;
        c.bench_function(&format!("frame_{}", name), |b| {
            b.iter(|| {
                let bytes: usize = def.commands().iter().map(|c| c.frame().len()).sum();
                black_box(bytes)
            })
        });

        let dumped = def.to_string();
        c.bench_function(&format!("reload_{}", name), |b| {
            b.iter(|| black_box(FormDefinition::parse(black_box(&dumped)).expect("parse")))
        });
    }
}

fn bench_validate(c: &mut Criterion) {
    let validator = RecordValidator::new(RatingSheet::student().policy()).expect("validator");
    let records = [
        "S,3401,567,2,10,09,08,07,06,05,04,03,02,01,-07",
        "S,3401,567,2,10,??,08,07,06,05,04,03,02,01,-07",
        "S,0000,567,2,10,09,08,07,06,05,04,03,02,01,-07",
        "S,9902,123,5,00,00,00,00,00,00,00,00,00,10,   ",
    ];
    c.bench_function("validate_student_records", |b| {
        b.iter(|| {
            let accepted = records
                .iter()
                .filter(|r| validator.validate_text(black_box(r)).is_ok())
                .count();
            black_box(accepted)
        })
    });
}

criterion_group!(benches, bench_forms, bench_validate);
criterion_main!(benches);
