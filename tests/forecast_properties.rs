use vaxsim::prelude::*;
use vaxsim::scenarios::ScenarioParameters;

const CASES: &str = "\
Report Date,FIPS,Locality,VDH Health District,Total Cases,Hospitalizations,Deaths
03/01/2021,51001,Accomack,Eastern Shore,\"2,400\",210,38
03/01/2021,51003,Albemarle,Blue Ridge,5600,190,71
02/01/2021,51001,Accomack,Eastern Shore,2100,180,30
02/01/2021,51003,Albemarle,Blue Ridge,4800,160,60
";

const VACCINES: &str = "\
Administration Date,FIPS,Locality,Health District,Facility Type,Vaccine Manufacturer,Dose Number,Vaccine Doses Administered Count
02/20/2021 12:00:00 AM,51001,Accomack,Eastern Shore,Pharmacy,Pfizer,1,1200
02/21/2021 12:00:00 AM,51003,Albemarle,Blue Ridge,Hospital,Moderna,1,3400
";

const POPULATIONS: &str = "Accomack,32316\nAlbemarle,109330\n";

const PARAMETERS: &str = "\
locality,rho,theta,sigma,kappa
Accomack,0.091,0.0071,0.074,0.0034
Albemarle,0.083,0.0065,0.071,0.0037
";

fn datasets() -> Datasets {
    let raw = RawDatasets {
        cases: RawTable::from_csv_reader(CASES.as_bytes(), true).unwrap(),
        vaccines: RawTable::from_csv_reader(VACCINES.as_bytes(), true).unwrap(),
        populations: RawTable::from_csv_reader(POPULATIONS.as_bytes(), false).unwrap(),
        parameters: RawTable::from_csv_reader(PARAMETERS.as_bytes(), true).unwrap(),
    };
    Datasets::normalize(&raw).unwrap()
}

fn scopes() -> Vec<RegionScope> {
    vec![
        RegionScope::Territory,
        RegionScope::region("Accomack"),
        RegionScope::region("Albemarle"),
    ]
}

// Property: one row per requested day, every value finite
#[test]
fn forecast_has_one_row_per_day() {
    let data = datasets();
    let config = SimulationConfig::default();

    for scope in scopes() {
        for named in NamedScenario::ALL {
            for horizon in [1, 2, 30, 180] {
                let trajectory =
                    simulate(&data, &config, &scope, &named.into(), horizon).unwrap();
                assert_eq!(trajectory.len() as i64, horizon, "{scope} {named}");
                assert!(trajectory.rows().iter().all(|r| r.is_finite()));
            }
        }
    }
}

// Property: S+I+R+F+V constant along the trajectory and close to one
#[test]
fn forecast_conserves_population() {
    let data = datasets();
    let config = SimulationConfig::default();

    for scope in scopes() {
        let trajectory =
            simulate(&data, &config, &scope, &NamedScenario::Baseline.into(), 120).unwrap();
        let total0 = trajectory.initial_state().unwrap().total();
        // Initial total exceeds one by roughly confirmed / population.
        assert!((total0 - 1.0).abs() < 0.1, "{scope}: {total0}");
        for row in trajectory.rows() {
            assert!((row.total() - total0).abs() < 1e-8, "{scope} t={}", row.time);
        }
    }
}

// Property: once transmission is subcritical, infections only decline
#[test]
fn subcritical_transmission_declines() {
    let data = datasets();
    let config = SimulationConfig::default();
    let custom = CustomParameters {
        rho: Some(0.01),
        theta: 0.006_831_25,
        sigma: 0.072_947_592,
        kappa: 0.003_590_055,
        v1: 0.00364,
    };

    let trajectory =
        simulate(&data, &config, &RegionScope::Territory, &custom.into(), 90).unwrap();
    let first = trajectory.initial_state().unwrap();
    let rates = ScenarioParameters {
        rho: 0.01,
        theta: custom.theta,
        sigma: custom.sigma,
        kappa: custom.kappa,
        v1: custom.v1,
    };
    assert!(rates.infected_growth(first.susceptible) < 0.0);

    let infected = trajectory.column(Compartment::Infected);
    assert!(infected.windows(2).all(|w| w[1] <= w[0]));
}

// Property: with no outflow from I, infections never decrease
#[test]
fn closed_infected_compartment_never_declines() {
    let data = datasets();
    let config = SimulationConfig::default();
    let custom = CustomParameters {
        rho: None,
        theta: 0.0,
        sigma: 0.0,
        kappa: 0.0,
        v1: 0.0,
    };

    for scope in scopes() {
        let trajectory = simulate(&data, &config, &scope, &custom.into(), 120).unwrap();
        let infected = trajectory.column(Compartment::Infected);
        assert!(infected.windows(2).all(|w| w[1] >= w[0] - 1e-12), "{scope}");
        let vaccinated = trajectory.column(Compartment::Vaccinated);
        assert!(vaccinated.iter().all(|v| v.abs() < f64::EPSILON));
    }
}

// Property: adverse spreads faster than baseline, favorable slower
#[test]
fn scenarios_order_peak_infection() {
    let data = datasets();
    let config = SimulationConfig::default();
    let scope = RegionScope::region("Albemarle");

    let peak = |named: NamedScenario| {
        simulate(&data, &config, &scope, &named.into(), 120)
            .unwrap()
            .peak_infection()
            .unwrap()
            .infected
    };

    let favorable = peak(NamedScenario::Favorable);
    let baseline = peak(NamedScenario::Baseline);
    let adverse = peak(NamedScenario::Adverse);
    assert!(favorable <= baseline);
    assert!(baseline < adverse);
}

#[test]
fn scenario_tokens_parse() {
    for (token, expected) in [
        ("real", NamedScenario::Baseline),
        ("Average", NamedScenario::Baseline),
        ("BAD", NamedScenario::Adverse),
        ("good", NamedScenario::Favorable),
    ] {
        let scenario: Scenario = token.parse().unwrap();
        assert_eq!(scenario, Scenario::Named(expected));
    }

    let err = "catastrophic".parse::<Scenario>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputValidation);
}

#[test]
fn unknown_region_has_no_partial_output() {
    let data = datasets();
    let config = SimulationConfig::default();
    let err = simulate(
        &data,
        &config,
        &RegionScope::region("Fairfax"),
        &NamedScenario::Baseline.into(),
        30,
    )
    .unwrap_err();
    assert!(matches!(err, SimError::UnknownRegion { .. }));
}

#[test]
fn forecast_csv_export() {
    let data = datasets();
    let config = SimulationConfig::default();
    let trajectory = simulate(
        &data,
        &config,
        &RegionScope::region("Accomack"),
        &NamedScenario::Favorable.into(),
        14,
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accomack.csv");
    trajectory.save_csv(&path).unwrap();

    let reread = RawTable::from_path(&path, true).unwrap();
    assert_eq!(reread.len(), 14);
    assert_eq!(reread.headers()[1], "Infected with COVID-19");
    assert_eq!(reread.headers()[5], "time");
}
