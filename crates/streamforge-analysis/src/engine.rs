//! Generic evolutionary and ant-colony search engines. The intra-partition
//! GA and the inter-partition ACO search are the same shape —
//! population/pheromone bookkeeping plus a pluggable cost — so they share
//! one engine instead of duplicating the termination and selection logic
//! in each phase.
//!
//! [`crate::ordering`] drives [`EvolutionaryEngine`]; [`crate::interpartition`]
//! drives [`AntColonyEngine`].

use rand::rngs::StdRng;
use rand::Rng;
use tracing::trace;

/// A candidate solution the GA can score. Lower fitness is better — both
/// engines in this module minimize.
pub trait Phenotype: Clone {
    fn fitness(&self) -> f64;
}

/// Round-based genetic algorithm: tournament selection, caller-supplied
/// crossover/mutation, elitist replacement. Terminates after
/// `convergence_rounds` consecutive rounds with no improvement to the
/// best fitness seen, or after `max_rounds`, whichever comes first.
pub struct EvolutionaryEngine<P: Phenotype> {
    population: Vec<P>,
    tournament_size: usize,
    mutation_rate: f64,
    max_rounds: usize,
    convergence_rounds: usize,
}

impl<P: Phenotype> EvolutionaryEngine<P> {
    pub fn new(
        population: Vec<P>,
        tournament_size: usize,
        mutation_rate: f64,
        max_rounds: usize,
        convergence_rounds: usize,
    ) -> Self {
        assert!(!population.is_empty(), "GA population must be non-empty");
        Self {
            population,
            tournament_size: tournament_size.max(2),
            mutation_rate,
            max_rounds,
            convergence_rounds,
        }
    }

    fn tournament_select<'a>(&'a self, rng: &mut StdRng) -> &'a P {
        let mut best: Option<&P> = None;
        for _ in 0..self.tournament_size {
            let candidate = &self.population[rng.gen_range(0..self.population.len())];
            let better = match best {
                Some(b) => candidate.fitness() < b.fitness(),
                None => true,
            };
            if better {
                best = Some(candidate);
            }
        }
        best.expect("tournament_size >= 2 guarantees at least one draw")
    }

    /// Runs the search. `crossover` combines two parents into a child;
    /// `mutate` perturbs a child in place with probability
    /// `mutation_rate`. Returns the best phenotype found and whether the
    /// search converged before `max_rounds`.
    pub fn run(
        &mut self,
        rng: &mut StdRng,
        crossover: impl Fn(&P, &P, &mut StdRng) -> P,
        mutate: impl Fn(&mut P, &mut StdRng),
    ) -> (P, bool) {
        let pop_size = self.population.len();
        let mut best = self.best().clone();
        let mut stale_rounds = 0usize;

        for round in 0..self.max_rounds {
            let mut next_gen = Vec::with_capacity(pop_size);
            // Elitism: the incumbent best always survives unmutated.
            next_gen.push(best.clone());
            while next_gen.len() < pop_size {
                let a = self.tournament_select(rng);
                let b = self.tournament_select(rng);
                let mut child = crossover(a, b, rng);
                if rng.gen_bool(self.mutation_rate) {
                    mutate(&mut child, rng);
                }
                next_gen.push(child);
            }
            self.population = next_gen;

            let round_best = self.best();
            if round_best.fitness() < best.fitness() {
                best = round_best.clone();
                stale_rounds = 0;
            } else {
                stale_rounds += 1;
            }
            trace!(round, stale_rounds, best_fitness = best.fitness(), "GA round complete");
            if stale_rounds >= self.convergence_rounds {
                return (best, true);
            }
        }
        (best, false)
    }

    fn best(&self) -> &P {
        self.population
            .iter()
            .min_by(|a, b| a.fitness().partial_cmp(&b.fitness()).expect("fitness is never NaN"))
            .expect("population is non-empty by construction")
    }
}

/// Pheromone-matrix ant colony search over permutations of `0..n`, used
/// for the inter-partition hamiltonian-path search. Pheromone starts
/// uniform; each round reinforces the edges used by the best tour found
/// this round, then decays everything toward `floor`.
pub struct AntColonyEngine {
    pheromone: Vec<Vec<f64>>,
    ants: usize,
    decay: f64,
    floor: f64,
    max_rounds: usize,
}

impl AntColonyEngine {
    pub fn new(n: usize, ants: usize, decay: f64, floor: f64, max_rounds: usize) -> Self {
        let initial = 1.0 / (n.max(1) as f64);
        Self {
            pheromone: vec![vec![initial; n]; n],
            ants: ants.max(1),
            decay,
            floor,
            max_rounds,
        }
    }

    /// `construct` builds one candidate tour from the current pheromone
    /// matrix; `cost` scores a tour (lower is better); `reinforce`
    /// deposits pheromone on the edges of the round's best tour (e.g.
    /// proportional to `1 / (1 + kendall_tau_distance)` to the prior
    /// incumbent).
    pub fn run(
        &mut self,
        rng: &mut StdRng,
        construct: impl Fn(&[Vec<f64>], &mut StdRng) -> Vec<usize>,
        cost: impl Fn(&[usize]) -> f64,
        reinforce: impl Fn(&mut Vec<Vec<f64>>, &[usize], f64),
    ) -> Vec<usize> {
        let mut best_tour = construct(&self.pheromone, rng);
        let mut best_cost = cost(&best_tour);

        for round in 0..self.max_rounds {
            let mut round_best: Option<(Vec<usize>, f64)> = None;
            for _ in 0..self.ants {
                let tour = construct(&self.pheromone, rng);
                let c = cost(&tour);
                let better = match &round_best {
                    Some((_, rc)) => c < *rc,
                    None => true,
                };
                if better {
                    round_best = Some((tour, c));
                }
            }
            let (tour, c) = round_best.expect("ants >= 1 guarantees a round best");

            for row in self.pheromone.iter_mut() {
                for v in row.iter_mut() {
                    *v = (*v * (1.0 - self.decay)).max(self.floor);
                }
            }
            reinforce(&mut self.pheromone, &tour, c);

            if c < best_cost {
                best_cost = c;
                best_tour = tour;
            }
            trace!(round, best_cost, "ACO round complete");
        }
        best_tour
    }
}
