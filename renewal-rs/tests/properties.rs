use proptest::prelude::*;
use renewal::{ConstGammaTg, Forecast, GenerationTime, ReconstructOptions, RtForecast, reconstruct};

fn ensemble_strategy() -> impl Strategy<Value = Vec<Vec<f64>>> {
    (1usize..5, 0usize..15).prop_flat_map(|(nsamples, nperiods)| {
        prop::collection::vec(prop::collection::vec(0.0f64..3.0, nperiods), nsamples)
    })
}

proptest! {
    #[test]
    fn pmf_tail_sums_to_one(shape in 0.2f64..30.0, rate in 0.1f64..5.0) {
        let tg = ConstGammaTg::new(shape, rate, None).unwrap();
        let pmf = tg.get_pmf_array(None).unwrap();
        let tail: f64 = pmf[1..].iter().sum();
        prop_assert!((tail - 1.0).abs() < 1e-9);
        prop_assert!(pmf.iter().all(|p| p.is_finite() && *p >= 0.0));
    }

    #[test]
    fn same_seed_same_forecast(
        rows in ensemble_strategy(),
        past in prop::collection::vec(0u64..500, 10..20),
        seed in any::<u64>(),
    ) {
        let tg = ConstGammaTg::new(3.0, 1.0, Some(10)).unwrap();
        let pmf = tg.get_pmf_array(None).unwrap();
        let rt = RtForecast::ensemble_from_rows(rows).unwrap();
        let options = ReconstructOptions::with_seed(seed);

        let a = reconstruct(&past, &rt, pmf, &options).unwrap();
        let b = reconstruct(&past, &rt, pmf, &options).unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.shape(), rt.shape());
    }

    #[test]
    fn single_matches_one_row_ensemble(
        values in prop::collection::vec(0.0f64..2.5, 0..20),
        past in prop::collection::vec(0u64..1000, 5..8),
        seed in any::<u64>(),
    ) {
        let pmf = [0.0, 0.2, 0.5, 0.3];
        let single = RtForecast::single(values.clone());
        let ensemble = RtForecast::ensemble_from_rows(vec![values]).unwrap();
        let options = ReconstructOptions::with_seed(seed);

        let a = reconstruct(&past, &single, &pmf, &options).unwrap();
        let b = reconstruct(&past, &ensemble, &pmf, &options).unwrap();
        prop_assert!(matches!(a, Forecast::Single(_)));
        prop_assert!(b.is_ensemble());
        prop_assert_eq!(a.row(0), b.row(0));
    }

    #[test]
    fn zero_history_stays_extinct(
        rows in ensemble_strategy(),
        seed in any::<u64>(),
    ) {
        // Nothing to renew from: every generated count is zero.
        let pmf = [0.0, 0.5, 0.5];
        let rt = RtForecast::ensemble_from_rows(rows).unwrap();
        let forecast = reconstruct(&[0, 0], &rt, &pmf, &ReconstructOptions::with_seed(seed)).unwrap();
        prop_assert!(forecast.csv_rows().iter().all(|row| row[2] == "0"));
    }
}
