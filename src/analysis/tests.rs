#[cfg(test)]
mod tests {
    use crate::analysis::rr::Trust;
    use crate::analysis::{AnalysisConfig, DetectionPathway, DetectionSnapshot, EventOrigin, PvcDetector};
    use crate::burden::calculate_burden;
    use crate::log::discard_logger;
    use crate::mock::SyntheticEcg;

    /// 800 ms at 130 Hz.
    const RR: usize = 104;

    fn detector() -> PvcDetector {
        PvcDetector::new(AnalysisConfig::default(), discard_logger())
    }

    fn feed(
        detector: &mut PvcDetector,
        ecg: &SyntheticEcg,
        len: usize,
        mut inspect: impl FnMut(usize, &DetectionSnapshot),
    ) -> DetectionSnapshot {
        let mut last = detector.snapshot();
        for (i, sample) in ecg.samples(len).into_iter().enumerate() {
            last = detector.process_sample(sample);
            inspect(i, &last);
        }
        last
    }

    /// Forty normal beats to learn from, then one early, tall beat and three
    /// normal ones.
    fn learning_then_pvc() -> SyntheticEcg {
        SyntheticEcg::new(130.0)
            .regular(60, 40, RR, 400.0)
            .beat(4181, 900.0)
            .beat(4324, 400.0)
            .beat(4428, 400.0)
            .beat(4532, 400.0)
    }

    fn assert_unit(value: f64, what: &str) {
        assert!((0.0..=1.0).contains(&value), "{} out of range: {}", what, value);
    }

    #[test]
    fn learns_then_flags_premature_high_amplitude_beat() {
        let ecg = learning_then_pvc();
        let mut detector = detector();
        let snapshot = feed(&mut detector, &ecg, 4700, |_, _| {});

        assert!(!snapshot.is_learning);
        let training = detector.training_status().latest_result.unwrap();
        assert_eq!(training.beats_used, 40);
        assert_eq!(training.clusters_found, 1);
        assert_eq!(training.template_count, 6);
        assert!(training.confidence > 0.8);

        assert_eq!(snapshot.total_beats, 44);
        assert_eq!(snapshot.pvc_count, 1);
        assert_eq!(snapshot.events.len(), 1);

        let event = snapshot.events[0];
        assert_eq!(event.timestamp_ms, ecg.timestamp_of(4181));
        assert_eq!(event.pathway, DetectionPathway::HighAmplitude);
        assert_eq!(event.origin, EventOrigin::Classified);
        assert!((event.confidence - 0.9).abs() < 1e-9);
        assert_eq!(event.rr_ms, 500.0);
        assert_eq!(event.expected_rr_ms, 800.0);
        assert_eq!(event.prematurity_pct, 38);
        assert!(event.amplitude > 850.0);

        assert!((snapshot.heart_rate - 75.0).abs() < 1e-9);
        assert!(snapshot.elapsed_ms > 3_000 && snapshot.elapsed_ms < 5_000);
    }

    #[test]
    fn wide_premature_beat_takes_the_wide_qrs_pathway() {
        let ecg = SyntheticEcg::new(130.0)
            .regular(60, 40, RR, 400.0)
            .shaped_beat(4181, 400.0, 6.0)
            .beat(4324, 400.0)
            .beat(4428, 400.0)
            .beat(4532, 400.0);
        let mut detector = detector();
        let snapshot = feed(&mut detector, &ecg, 4700, |_, _| {});

        assert_eq!(snapshot.pvc_count, 1);
        let event = snapshot.events[0];
        assert_eq!(event.pathway, DetectionPathway::WideQrs);
        assert!(event.qrs_width_ms > 120.0);
        assert!((event.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn learning_ends_exactly_once_at_the_fortieth_beat() {
        let ecg = SyntheticEcg::new(130.0).regular(60, 50, RR, 400.0);
        let mut detector = detector();
        let mut transitions = Vec::new();
        let mut was_learning = true;

        feed(&mut detector, &ecg, 5_300, |i, snapshot| {
            assert!(was_learning || !snapshot.is_learning, "back to learning at sample {}", i);
            if was_learning && !snapshot.is_learning {
                transitions.push(snapshot.total_beats);
            }
            was_learning = snapshot.is_learning;
        });
        assert_eq!(transitions, vec![40]);
        assert_eq!(detector.take_finished_training().map(|r| r.beats_used), Some(40));
        assert_eq!(detector.take_finished_training(), None);

        detector.reset();
        let status = detector.training_status();
        assert!(status.is_learning);
        assert_eq!(status.progress, 0);
        assert_eq!(status.latest_result, None);
        assert_eq!(detector.template_count(), 0);
        assert!(detector.rr_history().is_empty());

        let snapshot = feed(&mut detector, &ecg, 5_300, |_, _| {});
        assert!(!snapshot.is_learning);
    }

    #[test]
    fn detection_state_stays_bounded_on_a_long_stream() {
        let ecg = SyntheticEcg::new(130.0).regular(60, 230, RR, 400.0);
        let mut detector = detector();
        let snapshot = feed(&mut detector, &ecg, 24_000, |_, snapshot| {
            assert!(snapshot.beats.len() <= 160);
            assert_unit(snapshot.signal_quality, "signal quality");
        });

        assert_eq!(snapshot.total_beats, 230);
        assert_eq!(snapshot.pvc_count, 0);
        assert!(snapshot.events.is_empty());
        assert!((snapshot.heart_rate - 75.0).abs() < 1e-9);

        let newest = detector.beats().last().unwrap().timestamp_ms;
        assert!(detector.beats().all(|b| b.timestamp_ms >= newest - 120_000));
        assert!(detector
            .rr_history()
            .intervals()
            .all(|rr| rr.end_ms >= newest - 120_000));
        assert!(detector.rr_history().trusted_len() <= 30);

        // everything after learning is classified once, except the newest beat
        let records = detector.take_records();
        assert_eq!(records.len(), 230 - 40 - 1);
        assert!(records.iter().all(|r| !r.is_pvc));
    }

    #[test]
    fn intervals_touching_a_pvc_are_never_trusted() {
        let ecg = learning_then_pvc();
        let mut detector = detector();
        feed(&mut detector, &ecg, 4700, |_, _| {});

        let pvc = ecg.timestamp_of(4181);
        let rr = detector.rr_history();
        let touching: Vec<_> = rr
            .intervals()
            .filter(|i| i.start_ms == pvc || i.end_ms == pvc)
            .collect();
        assert_eq!(touching.len(), 2);
        assert!(touching.iter().all(|i| i.trust == Trust::Raw));

        let after = rr.ending_at(ecg.timestamp_of(4428)).unwrap();
        assert!(after.is_trusted());
        assert_eq!(rr.expected_rr(), 800.0);
    }

    #[test]
    fn missed_beat_is_inferred_once() {
        let ecg = SyntheticEcg::new(130.0)
            .regular(60, 49, RR, 400.0)
            .regular(60 + 50 * RR, 10, RR, 400.0);
        let mut detector = detector();
        let snapshot = feed(&mut detector, &ecg, 6_300, |_, _| {});

        // 59 detected plus the inferred one
        assert_eq!(snapshot.total_beats, 60);
        assert_eq!(snapshot.pvc_count, 1);
        assert_eq!(snapshot.events.len(), 1);

        let event = snapshot.events[0];
        let (before, after) = (ecg.timestamp_of(60 + 48 * RR), ecg.timestamp_of(60 + 50 * RR));
        assert_eq!(event.origin, EventOrigin::Inferred);
        assert_eq!(event.pathway, DetectionPathway::GapDetected);
        assert_eq!(event.timestamp_ms, before + (after - before) / 2);
        assert_eq!(event.rr_ms, 1_600.0);
        assert_eq!(event.confidence, 0.5);

        let inferred: Vec<_> = detector.take_records().into_iter().filter(|r| r.is_pvc).collect();
        assert_eq!(inferred.len(), 1);
        assert_eq!(inferred[0].timestamp_ms, event.timestamp_ms);
    }

    #[test]
    fn counter_reset_keeps_what_was_learned() {
        let ecg = learning_then_pvc();
        let samples = ecg.samples(4_701);
        let mut detector = detector();
        for sample in &samples[..4_700] {
            detector.process_sample(*sample);
        }
        let templates = detector.template_count();
        let intervals = detector.rr_history().len();
        let beats = detector.beats().count();

        detector.reset_counters();
        let snapshot = detector.process_sample(samples[4_700]);

        assert!(!snapshot.is_learning);
        assert_eq!(snapshot.pvc_count, 0);
        // the newest beat is still pending and is counted after the reset
        assert_eq!(snapshot.total_beats, 1);
        assert!(snapshot.events.is_empty());
        assert_eq!(snapshot.elapsed_ms, 0);

        assert_eq!(detector.template_count(), templates);
        assert_eq!(detector.rr_history().len(), intervals);
        assert_eq!(detector.beats().count(), beats);
    }

    #[test]
    fn counter_reset_with_pending_pvc_keeps_counts_consistent() {
        let ecg = learning_then_pvc();
        let samples = ecg.samples(4_700);
        let mut detector = detector();
        // the tall beat at 4181 is detected but waits for its successor
        for sample in &samples[..4_300] {
            detector.process_sample(*sample);
        }
        assert_eq!(detector.snapshot().pvc_count, 0);

        detector.reset_counters();
        let mut snapshot = detector.snapshot();
        for sample in &samples[4_300..] {
            snapshot = detector.process_sample(*sample);
            assert!(snapshot.pvc_count <= snapshot.total_beats);
        }

        assert_eq!(snapshot.pvc_count, 1);
        assert_eq!(snapshot.total_beats, 4);
        assert_eq!(snapshot.events.len(), 1);
        let burden = calculate_burden(
            snapshot.total_beats as u64,
            snapshot.pvc_count as u64,
            snapshot.elapsed_ms,
            snapshot.heart_rate,
        );
        assert_eq!(burden.burden, 25.0);
    }

    #[test]
    fn implausible_heart_rate_reads_as_zero() {
        let rate_at = |rr_samples: usize| {
            let ecg = SyntheticEcg::new(130.0).regular(60, 12, rr_samples, 400.0);
            let mut detector = detector();
            let snapshot = feed(&mut detector, &ecg, 120 + 11 * rr_samples, |_, _| {});
            assert_eq!(snapshot.total_beats, 12);
            snapshot.heart_rate
        };

        // about 1.54 s apart, just under 40 bpm
        assert_eq!(rate_at(200), 0.0);
        // about 1.46 s apart, just over
        let plausible = rate_at(190);
        assert!(plausible > 40.0 && plausible < 42.0, "{}", plausible);
    }

    #[test]
    fn held_records_are_capped_until_taken() {
        let ecg = SyntheticEcg::new(130.0).regular(60, 120, RR, 400.0);
        let config = AnalysisConfig {
            record_capacity: 25,
            ..AnalysisConfig::default()
        };
        let mut detector = PvcDetector::new(config, discard_logger());
        feed(&mut detector, &ecg, 12_600, |_, _| {});

        let records = detector.take_records();
        assert_eq!(records.len(), 25);
        // newest kept, the pending beat excluded
        assert_eq!(records.last().map(|r| r.timestamp_ms), Some(ecg.timestamp_of(60 + 118 * RR)));
        assert!(records.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
        assert!(detector.take_records().is_empty());
    }

    #[test]
    fn reported_confidences_stay_in_unit_range() {
        let scenarios = [
            learning_then_pvc(),
            SyntheticEcg::new(130.0)
                .regular(60, 49, RR, 400.0)
                .regular(60 + 50 * RR, 10, RR, 400.0),
            SyntheticEcg::new(130.0).regular(60, 60, RR, 400.0).noise(40.0).seed(3),
        ];
        for ecg in &scenarios {
            let mut detector = detector();
            let snapshot = feed(&mut detector, ecg, 6_300, |_, s| assert_unit(s.signal_quality, "signal quality"));
            for event in &snapshot.events {
                assert_unit(event.confidence, "event confidence");
            }
            if let Some(result) = detector.training_status().latest_result {
                assert_unit(result.confidence, "training confidence");
                assert_unit(result.quality, "training quality");
                assert_unit(result.dominance_ratio, "dominance");
            }
            for record in detector.take_records() {
                assert_unit(record.confidence, "beat confidence");
            }
        }
    }
}
