use std::ops::{Index, IndexMut};

use rand::RngCore;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::common::Settings;
use crate::ctrnn::genome::{Genome, GenomeError};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Citizen {
    pub genome: Genome,
    pub fitness: Option<f64>,
    pub age: usize,
    /// Selection weight assigned during SUS. Only meaningful inside one selection.
    #[serde(skip)]
    pub rank_weight: f64,
}

impl Citizen {
    pub fn create(genome: Genome) -> Citizen {
        Citizen { genome, fitness: None, age: 0, rank_weight: 0.0 }
    }

    pub fn init<R: RngCore>(rng: &mut R, settings: &Settings) -> Result<Citizen, GenomeError> {
        Ok(Citizen::create(Genome::init(rng, settings.shape, &settings.init)?))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Citizens(Vec<Citizen>);

impl Citizens {
    pub fn new(data: Vec<Citizen>) -> Citizens {
        Citizens(data)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&Citizen> {
        self.0.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Citizen> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Citizen> {
        self.0.iter_mut()
    }

    pub fn as_slice(&self) -> &[Citizen] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [Citizen] {
        &mut self.0
    }

    pub fn sort_by(&mut self, compare: impl FnMut(&Citizen, &Citizen) -> std::cmp::Ordering) {
        self.0.sort_by(compare);
    }
}

impl Index<usize> for Citizens {
    type Output = Citizen;
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl IndexMut<usize> for Citizens {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl<'a> IntoParallelIterator for &'a Citizens {
    type Item = &'a Citizen;
    type Iter = rayon::slice::Iter<'a, Citizen>;

    fn into_par_iter(self) -> Self::Iter {
        self.0.par_iter()
    }
}

impl<'a> IntoParallelIterator for &'a mut Citizens {
    type Item = &'a mut Citizen;
    type Iter = rayon::slice::IterMut<'a, Citizen>;

    fn into_par_iter(self) -> Self::Iter {
        self.0.par_iter_mut()
    }
}

impl FromIterator<Citizen> for Citizens {
    fn from_iter<I: IntoIterator<Item = Citizen>>(iter: I) -> Self {
        Citizens(iter.into_iter().collect())
    }
}
