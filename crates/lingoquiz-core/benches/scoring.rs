use criterion::{black_box, criterion_group, criterion_main, Criterion};

use lingoquiz_core::grade::GradeScale;
use lingoquiz_core::ledger::LedgerSnapshot;
use lingoquiz_core::model::{AnswerOption, AnswerValue, CorrectionMode, Question, QuestionKind, QuizConfig};
use lingoquiz_core::scoring::{evaluate, matched_blanks, score_attempt};

fn fill_blank(id: usize, blanks: usize) -> Question {
    Question {
        id: format!("blank-{id}"),
        text: vec!["___"; blanks].join(" y "),
        points: 4,
        kind: QuestionKind::FillBlank {
            expected_blanks: (0..blanks).map(|i| format!("palabra{i}")).collect(),
        },
        explanation: None,
        difficulty: None,
    }
}

fn single_choice(id: usize) -> Question {
    Question {
        id: format!("choice-{id}"),
        text: format!("Question {id}"),
        points: 1,
        kind: QuestionKind::SingleChoice {
            options: (0..4)
                .map(|i| AnswerOption {
                    id: format!("o{i}"),
                    text: format!("Option {i}"),
                    is_correct: i == 2,
                })
                .collect(),
        },
        explanation: None,
        difficulty: None,
    }
}

fn generate_quiz(n: usize) -> (QuizConfig, LedgerSnapshot) {
    let mut questions = Vec::with_capacity(n);
    let mut snapshot = LedgerSnapshot::default();
    for i in 0..n {
        if i % 2 == 0 {
            let q = fill_blank(i, 3);
            snapshot
                .answers
                .insert(q.id.clone(), AnswerValue::text(" Palabra0 |palabra1|otra"));
            questions.push(q);
        } else {
            let q = single_choice(i);
            let pick = if i % 3 == 0 { "o2" } else { "o1" };
            snapshot.answers.insert(q.id.clone(), AnswerValue::option(pick));
            questions.push(q);
        }
    }
    let quiz = QuizConfig {
        id: format!("bench-{n}"),
        title: String::new(),
        questions,
        time_limit_seconds: None,
        passing_score_percent: 60,
        max_attempts: 1,
        correction_mode: CorrectionMode::EndOfQuiz,
    };
    (quiz, snapshot)
}

fn bench_fill_blank(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill_blank");

    let expected: Vec<String> = (0..10).map(|i| format!("palabra{i}")).collect();
    let submitted = (0..10)
        .map(|i| format!("  PALABRA{i} "))
        .collect::<Vec<_>>()
        .join("|");

    group.bench_function("matched_blanks_10", |b| {
        b.iter(|| matched_blanks(black_box(&expected), black_box(&submitted)))
    });

    let question = fill_blank(0, 10);
    let answer = AnswerValue::text(submitted.clone());
    group.bench_function("evaluate_10", |b| {
        b.iter(|| evaluate(black_box(&question), black_box(&answer)))
    });

    group.finish();
}

fn bench_score_attempt(c: &mut Criterion) {
    let mut group = c.benchmark_group("score_attempt");
    let scale = GradeScale::default();

    for n in [10, 100, 500] {
        let (quiz, snapshot) = generate_quiz(n);
        group.bench_function(format!("{n}_questions"), |b| {
            b.iter(|| score_attempt(black_box(&quiz), black_box(&snapshot), &scale))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fill_blank, bench_score_attempt);
criterion_main!(benches);
