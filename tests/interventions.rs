//! Intervention behavior through the public API: NPI targeting and expiry,
//! and their effect on epidemic size.

use rand::SeedableRng;
use rand::rngs::SmallRng;

use epi_sim::disease::{DeterministicSeatird, DiseaseModel, InitialInfection};
use epi_sim::npi::{NpiRecord, NpiSchedule};
use epi_sim::params::SeatirdParameters;
use epi_sim::scenario::Scenario;
use epi_sim::vaccine::VaccineModel;

fn seatird_rates(num_ages: usize) -> epi_sim::params::SeatirdRates {
    SeatirdParameters {
        r0: 1.5,
        beta_scale: 10.0,
        tau: 2.0,
        kappa: 2.0,
        chi: 2.0,
        gamma: 4.0,
        nu: vec![0.001; num_ages],
        sigma: None,
    }
    .bind(num_ages)
    .unwrap()
}

fn five_node_scenario() -> epi_sim::Network {
    let mut scenario = Scenario::seatird(2);
    for id in [113, 141, 201, 300, 400] {
        scenario = scenario.node(id, vec![500.0, 500.0]);
    }
    scenario.build()
}

#[test]
fn npi_targets_named_nodes_and_expires() {
    let network = five_node_scenario();
    let npis = vec![NpiRecord {
        day: 0,
        duration: 2,
        location: "113,141,201".to_string(),
        effectiveness: vec![0.9, 0.0],
    }];
    let schedule = NpiSchedule::build(&npis, 10, &network).unwrap();
    let contact = vec![vec![1.0, 0.5], vec![0.5, 1.0]];
    let model = DeterministicSeatird::new(seatird_rates(2), schedule, contact);

    let baseline = 0.15;
    for now in 0..=2 {
        for node in 0..3 {
            let beta = model.beta_with_npi(now, node);
            assert!(
                (beta[0] - 0.1 * baseline).abs() < 1e-12,
                "targeted node {node} day {now}: {}",
                beta[0]
            );
            assert!((beta[1] - baseline).abs() < 1e-12, "age 1 must be untouched");
        }
        for node in 3..5 {
            let beta = model.beta_with_npi(now, node);
            assert!(
                (beta[0] - baseline).abs() < 1e-12,
                "non-targeted node {node} day {now}"
            );
        }
    }
    for node in 0..5 {
        let beta = model.beta_with_npi(3, node);
        assert!(
            (beta[0] - baseline).abs() < 1e-12,
            "NPI must expire by day 3 on node {node}"
        );
    }
}

#[test]
fn network_wide_npi_shrinks_the_epidemic() {
    let attack_size = |effectiveness: f64| {
        let mut network = five_node_scenario();
        let npis = vec![NpiRecord {
            day: 0,
            duration: 60,
            location: "0".to_string(),
            effectiveness: vec![effectiveness, effectiveness],
        }];
        let schedule = NpiSchedule::build(&npis, 60, &network).unwrap();
        let contact = vec![vec![4.0, 1.0], vec![1.0, 4.0]];
        let mut model = DeterministicSeatird::new(seatird_rates(2), schedule, contact);
        let vaccine = VaccineModel::none(2);
        let mut rng = SmallRng::seed_from_u64(3);

        model
            .set_initial_conditions(
                &[InitialInfection {
                    county: 113,
                    age_group: 0,
                    infected: 10.0,
                }],
                &mut network,
                &vaccine,
                &mut rng,
            )
            .unwrap();
        for day in 1..=60 {
            for i in 0..network.num_nodes() {
                model.simulate(&mut network.nodes[i], day, &vaccine, &mut rng);
            }
        }
        // Attack size: everyone no longer susceptible.
        let total: f64 = network.total_population();
        let susceptible: f64 = network
            .nodes
            .iter()
            .map(|n| n.compartments.compartment_totals()[0])
            .sum();
        total - susceptible
    };

    let unmitigated = attack_size(0.0);
    let mitigated = attack_size(0.8);
    assert!(
        mitigated < unmitigated * 0.5,
        "NPI should cut the epidemic substantially: {mitigated} vs {unmitigated}"
    );
}
