use rand::{
    distributions::{Distribution, WeightedIndex},
    Rng, RngCore,
};

use super::{citizen::Citizen, population::EvolveError};

/// Baker's linear ranking weight of rank `index` (0 = best) among `size`
/// citizens, normalised so the weights sum to one.
pub fn rank_weight(index: usize, size: usize, max_exp_offspring: f64) -> f64 {
    if size <= 1 {
        return 1.0;
    }
    (max_exp_offspring + (2.0 - 2.0 * max_exp_offspring) * index as f64 / (size - 1) as f64) / size as f64
}

/// Stochastic universal sampling over citizens sorted best first. A single
/// pointer in [0, 1) advances by one for each pick, so rank `i` receives
/// about `size * rank_weight(i)` copies. Copies keep genome, fitness and age.
pub fn sus<R: RngCore>(rng: &mut R, citizens: &mut [Citizen], max_exp_offspring: f64) -> Result<Vec<Citizen>, EvolveError> {
    let size = citizens.len();
    if size == 0 {
        return Err(EvolveError::EmptyPopulation);
    }
    for (i, citizen) in citizens.iter_mut().enumerate() {
        citizen.rank_weight = rank_weight(i, size, max_exp_offspring);
    }

    let mut selected = Vec::with_capacity(size);
    let mut pointer: f64 = rng.gen();
    let mut total = 0.0;
    let mut last_positive = 0;
    for (i, citizen) in citizens.iter().enumerate() {
        if citizen.rank_weight > 0.0 {
            last_positive = i;
        }
        total += size as f64 * citizen.rank_weight;
        while selected.len() < size && pointer < total {
            selected.push(citizen.clone());
            pointer += 1.0;
        }
    }
    // rounding can leave the cumulative total a hair below the last pointer
    while selected.len() < size {
        selected.push(citizens[last_positive].clone());
    }
    Ok(selected)
}

/// Roulette wheel with weights `size, size - 1, ..., 1` by rank.
pub fn rank_roulette<R: RngCore>(rng: &mut R, citizens: &[Citizen]) -> Result<Vec<Citizen>, EvolveError> {
    let size = citizens.len();
    if size == 0 {
        return Err(EvolveError::EmptyPopulation);
    }
    let wheel = WeightedIndex::new((1..=size).rev())?;
    Ok((0..size).map(|_| citizens[wheel.sample(rng)].clone()).collect())
}

/// Keeps the best 90% and refills the rest with copies of the very best.
pub fn truncation(citizens: &[Citizen]) -> Result<Vec<Citizen>, EvolveError> {
    let size = citizens.len();
    if size == 0 {
        return Err(EvolveError::EmptyPopulation);
    }
    let survivors = (9 * size / 10).max(1);
    let mut selected = citizens[..survivors].to_vec();
    selected.extend(citizens.iter().take(size - survivors).cloned());
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Settings;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn ranked(n: usize) -> Vec<Citizen> {
        let settings = Settings::standard(3, 1);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(17);
        (0..n)
            .map(|i| {
                let mut citizen = Citizen::init(&mut rng, &settings).unwrap();
                citizen.fitness = Some(1.0 - i as f64 / n as f64);
                citizen.age = i;
                citizen
            })
            .collect()
    }

    #[test]
    fn rank_weights_sum_to_one() {
        for e in [1.0, 1.1, 1.5, 2.0, 3.0] {
            let total: f64 = (0..50).map(|i| rank_weight(i, 50, e)).sum();
            assert_approx_eq!(total, 1.0);
        }
        assert_approx_eq!(rank_weight(0, 10, 1.1) * 10.0, 1.1);
        assert_approx_eq!(rank_weight(9, 10, 1.1) * 10.0, 0.9);
        assert_eq!(rank_weight(0, 1, 1.1), 1.0);
    }

    #[test]
    fn sus_preserves_size_and_copies() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        for n in [1, 2, 7, 96] {
            let mut citizens = ranked(n);
            let selected = sus(&mut rng, &mut citizens, 1.1).unwrap();
            assert_eq!(selected.len(), n);
            for s in &selected {
                let parent = &citizens[s.age];
                assert_eq!(s.genome, parent.genome);
                assert_eq!(s.fitness, parent.fitness);
            }
        }
    }

    #[test]
    fn sus_single_citizen_is_copied() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
        let mut citizens = ranked(1);
        let selected = sus(&mut rng, &mut citizens, 2.0).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].genome, citizens[0].genome);
    }

    #[test]
    fn sus_empty_population_fails() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        assert!(matches!(sus(&mut rng, &mut [], 1.1), Err(EvolveError::EmptyPopulation)));
    }

    #[test]
    fn sus_gives_the_best_its_expected_copies() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);
        let mut citizens = ranked(40);
        let repeats = 500;
        let mut best_copies = 0;
        for _ in 0..repeats {
            let selected = sus(&mut rng, &mut citizens, 3.0).unwrap();
            best_copies += selected.iter().filter(|c| c.age == 0).count();
        }
        // SUS bounds the count to floor/ceil of the expectation
        let mean = best_copies as f64 / repeats as f64;
        assert!((mean - 3.0).abs() < 0.05, "mean copies {mean}");
    }

    #[test]
    fn sus_preserves_relative_order() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let mut citizens = ranked(30);
        let selected = sus(&mut rng, &mut citizens, 1.5).unwrap();
        assert!(selected.windows(2).all(|w| w[0].age <= w[1].age));
    }

    #[test]
    fn rank_roulette_and_truncation_preserve_size() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(6);
        let citizens = ranked(25);
        assert_eq!(rank_roulette(&mut rng, &citizens).unwrap().len(), 25);

        let truncated = truncation(&citizens).unwrap();
        assert_eq!(truncated.len(), 25);
        // 22 survivors, then copies of ranks 0, 1, 2
        assert_eq!(truncated.iter().map(|c| c.age).collect::<Vec<_>>()[22..], [0, 1, 2]);
        assert!(truncated.iter().all(|c| c.age < 22));
    }
}
