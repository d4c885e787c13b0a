use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::hint::black_box;
use therapy_tracker::models::{ActivitySession, RawSessionEntry};
use therapy_tracker::services::SessionFilter;

/// A year of sessions: several per day, alternating hands and exercises.
fn fixture() -> Vec<ActivitySession> {
    let exercises = ["Fist", "Pinch", "Hand Reach", "Wrist Flex"];
    (0..5_000)
        .map(|i| {
            let raw: RawSessionEntry = serde_json::from_value(json!({
                "Username": "bench@x.com",
                "SessionID": format!("s{}", i),
                "Timestamp": 1_735_689_600_000i64 + i as i64 * 6_300_000,
                "ExerciseName": exercises[i % exercises.len()],
                "Hand": if i % 2 == 0 { "Left" } else { "Right" },
                "Accuracy": 0.8,
                "Reps": 10,
                "Scores": [0.7, 0.8, 0.9],
            }))
            .expect("Failed to build raw entry");
            raw.normalize().expect("Failed to normalize entry")
        })
        .collect()
}

fn benchmark_filter(c: &mut Criterion) {
    let sessions = fixture();

    let unfiltered = SessionFilter::default().parse().expect("valid filter");
    let combined = SessionFilter {
        hand: Some("right".to_string()),
        exercise_name: Some("hand reach".to_string()),
        start: Some("2025-03-01T00:00:00Z".to_string()),
        end: Some("2025-06-30T23:59:59Z".to_string()),
    }
    .parse()
    .expect("valid filter");

    let mut group = c.benchmark_group("session_filter");

    group.bench_function("no_constraints", |b| {
        b.iter(|| {
            black_box(&sessions)
                .iter()
                .filter(|s| unfiltered.matches(s))
                .count()
        })
    });

    group.bench_function("hand_exercise_range", |b| {
        b.iter(|| {
            black_box(&sessions)
                .iter()
                .filter(|s| combined.matches(s))
                .count()
        })
    });

    group.bench_function("fingerprint", |b| {
        b.iter(|| black_box(&combined).fingerprint())
    });

    group.finish();
}

criterion_group!(benches, benchmark_filter);
criterion_main!(benches);
