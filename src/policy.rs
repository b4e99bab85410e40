use burn::prelude::*;
use rand::Rng;
use rand_pcg::Pcg64;

use crate::sim::Action;
use crate::sonar::State;

/// Picks the next action index from a normalized sonar state.
pub trait Policy {
    fn act(&mut self, state: &State, rng: &mut Pcg64) -> u32;
}

/// Uniformly random actions.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPolicy;

impl Policy for RandomPolicy {
    fn act(&mut self, _state: &State, rng: &mut Pcg64) -> u32 {
        rng.gen_range(0..Action::COUNT as u32)
    }
}

// Q-network: one value per action.
#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    linear0: nn::Linear<B>,
    linear1: nn::Linear<B>,
    linear2: nn::Linear<B>,
    activation: nn::Relu,
}

impl<B: Backend> Model<B> {
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.linear0.forward(x));
        let x = self.activation.forward(self.linear1.forward(x));
        self.linear2.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct ModelConfig {
    hidden_size: usize,
    #[config(default = 17)]
    input_size: usize,
    #[config(default = 4)]
    output_size: usize,
    /// Chance of a random action instead of the greedy one.
    #[config(default = 0.0)]
    epsilon: f32,
}

impl ModelConfig {
    /// Returns a policy with freshly initialized weights.
    pub fn init<B: Backend>(&self, device: &B::Device) -> NetworkPolicy<B> {
        let network = Model {
            linear0: nn::LinearConfig::new(self.input_size, self.hidden_size).init(device),
            linear1: nn::LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            linear2: nn::LinearConfig::new(self.hidden_size, self.output_size).init(device),
            activation: nn::Relu::new(),
        };
        NetworkPolicy {
            network,
            device: device.clone(),
            epsilon: self.epsilon,
        }
    }
}

/// Greedy (optionally epsilon-greedy) play with a Q-network.
pub struct NetworkPolicy<B: Backend> {
    pub network: Model<B>,
    device: B::Device,
    epsilon: f32,
}

impl<B: Backend> NetworkPolicy<B> {
    pub fn set_epsilon(&mut self, epsilon: f32) {
        self.epsilon = epsilon;
    }

    pub fn q_values(&self, state: &State) -> Vec<f32> {
        let input = Tensor::<B, 1>::from_floats(state.as_slice(), &self.device).unsqueeze::<2>();
        match self.network.forward(input).into_data().to_vec::<f32>() {
            Ok(values) => values,
            Err(e) => {
                log::warn!("Could not read q-values: {:?}", e);
                vec![]
            }
        }
    }

    pub fn greedy(&self, state: &State) -> u32 {
        self.q_values(state)
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i as u32)
            .unwrap_or(Action::Noop.index())
    }
}

impl<B: Backend> Policy for NetworkPolicy<B> {
    fn act(&mut self, state: &State, rng: &mut Pcg64) -> u32 {
        if rng.gen::<f32>() < self.epsilon {
            let output_size = self.network.linear2.weight.shape().dims[1];
            rng.gen_range(0..output_size) as u32
        } else {
            self.greedy(state)
        }
    }
}
