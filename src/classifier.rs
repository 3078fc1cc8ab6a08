// src/classifier.rs - Segment-pooled temporal classifier with one hidden layer
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Flat, column-major weights as stored in a model blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierWeights {
    pub frame_features: usize,
    pub segments: usize,
    pub hidden_units: usize,
    pub classes: usize,
    pub w1: Vec<f64>,
    pub b1: Vec<f64>,
    pub w2: Vec<f64>,
    pub b2: Vec<f64>,
}

/// Encodes a normalized `[frames x features]` sequence as the mean of each
/// temporal segment plus the last-minus-first segment difference, then runs
/// a tanh hidden layer and a softmax output.
#[derive(Debug, Clone)]
pub struct TemporalClassifier {
    frame_features: usize,
    segments: usize,
    w1: DMatrix<f64>, // hidden x input
    b1: DVector<f64>,
    w2: DMatrix<f64>, // classes x hidden
    b2: DVector<f64>,
}

#[derive(Debug, Clone)]
pub struct Gradients {
    pub w1: DMatrix<f64>,
    pub b1: DVector<f64>,
    pub w2: DMatrix<f64>,
    pub b2: DVector<f64>,
}

impl Gradients {
    fn zeros_like(model: &TemporalClassifier) -> Self {
        Self {
            w1: DMatrix::zeros(model.w1.nrows(), model.w1.ncols()),
            b1: DVector::zeros(model.b1.len()),
            w2: DMatrix::zeros(model.w2.nrows(), model.w2.ncols()),
            b2: DVector::zeros(model.b2.len()),
        }
    }

    fn scale(&mut self, factor: f64) {
        self.w1 *= factor;
        self.b1 *= factor;
        self.w2 *= factor;
        self.b2 *= factor;
    }
}

impl TemporalClassifier {
    pub fn new(
        frame_features: usize,
        segments: usize,
        hidden_units: usize,
        classes: usize,
        rng: &mut SeededRng,
    ) -> Self {
        let input_dim = (segments + 1) * frame_features;
        Self {
            frame_features,
            segments,
            w1: xavier(hidden_units, input_dim, rng),
            b1: DVector::zeros(hidden_units),
            w2: xavier(classes, hidden_units, rng),
            b2: DVector::zeros(classes),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.w1.ncols()
    }

    pub fn classes(&self) -> usize {
        self.w2.nrows()
    }

    pub fn encode(&self, sequence: &[DVector<f64>]) -> DVector<f64> {
        let f = self.frame_features;
        let mut encoded = DVector::zeros(self.input_dim());
        if sequence.is_empty() {
            return encoded;
        }

        let len = sequence.len();
        let mut means: Vec<DVector<f64>> = Vec::with_capacity(self.segments);
        for s in 0..self.segments {
            let start = (s * len / self.segments).min(len - 1);
            let end = ((s + 1) * len / self.segments).max(start + 1).min(len);
            let mut mean = DVector::zeros(f);
            for row in &sequence[start..end] {
                mean += row;
            }
            mean /= (end - start) as f64;
            encoded.rows_mut(s * f, f).copy_from(&mean);
            means.push(mean);
        }

        if let (Some(first), Some(last)) = (means.first(), means.last()) {
            encoded
                .rows_mut(self.segments * f, f)
                .copy_from(&(last - first));
        }
        encoded
    }

    /// Hidden activations and class probabilities for an encoded input.
    pub fn forward(&self, input: &DVector<f64>) -> (DVector<f64>, DVector<f64>) {
        let hidden = (&self.w1 * input + &self.b1).map(f64::tanh);
        let logits = &self.w2 * &hidden + &self.b2;
        (hidden, softmax(&logits))
    }

    pub fn predict_proba(&self, sequence: &[DVector<f64>]) -> DVector<f64> {
        self.forward(&self.encode(sequence)).1
    }

    /// Mean cross-entropy gradients over a batch of encoded inputs.
    /// Returns the summed loss and the number of correct predictions too.
    pub fn batch_gradients(&self, batch: &[(&DVector<f64>, usize)]) -> (Gradients, f64, usize) {
        let mut grads = Gradients::zeros_like(self);
        let mut loss = 0.0;
        let mut correct = 0;

        for (input, target) in batch {
            let (hidden, probs) = self.forward(input);
            loss -= probs[*target].clamp(1e-12, 1.0).ln();
            if argmax(&probs) == *target {
                correct += 1;
            }

            let mut d_logits = probs;
            d_logits[*target] -= 1.0;

            grads.w2 += &d_logits * hidden.transpose();
            grads.b2 += &d_logits;

            let d_hidden = self.w2.transpose() * &d_logits;
            let d_pre = d_hidden.zip_map(&hidden, |g, h| g * (1.0 - h * h));
            grads.w1 += &d_pre * input.transpose();
            grads.b1 += &d_pre;
        }

        if !batch.is_empty() {
            grads.scale(1.0 / batch.len() as f64);
        }
        (grads, loss, correct)
    }

    /// Summed loss and correct count without computing gradients.
    pub fn evaluate(&self, inputs: &[(&DVector<f64>, usize)]) -> (f64, usize) {
        inputs.iter().fold((0.0, 0), |(loss, correct), (input, target)| {
            let (_, probs) = self.forward(input);
            let hit = usize::from(argmax(&probs) == *target);
            (loss - probs[*target].clamp(1e-12, 1.0).ln(), correct + hit)
        })
    }

    pub fn to_weights(&self) -> ClassifierWeights {
        ClassifierWeights {
            frame_features: self.frame_features,
            segments: self.segments,
            hidden_units: self.w1.nrows(),
            classes: self.w2.nrows(),
            w1: self.w1.as_slice().to_vec(),
            b1: self.b1.as_slice().to_vec(),
            w2: self.w2.as_slice().to_vec(),
            b2: self.b2.as_slice().to_vec(),
        }
    }

    /// Rebuilds from stored weights, rejecting inconsistent shapes.
    pub fn from_weights(weights: &ClassifierWeights) -> Result<Self, String> {
        let input_dim = (weights.segments + 1) * weights.frame_features;
        let h = weights.hidden_units;
        let c = weights.classes;

        if weights.segments == 0 || h == 0 || c == 0 {
            return Err("classifier dimensions must be positive".to_string());
        }
        if weights.w1.len() != h * input_dim
            || weights.b1.len() != h
            || weights.w2.len() != c * h
            || weights.b2.len() != c
        {
            return Err(format!(
                "weight shapes do not match {}x{} / {}x{}",
                h, input_dim, c, h
            ));
        }

        Ok(Self {
            frame_features: weights.frame_features,
            segments: weights.segments,
            w1: DMatrix::from_vec(h, input_dim, weights.w1.clone()),
            b1: DVector::from_vec(weights.b1.clone()),
            w2: DMatrix::from_vec(c, h, weights.w2.clone()),
            b2: DVector::from_vec(weights.b2.clone()),
        })
    }

    pub fn apply(&mut self, step: &Gradients) {
        self.w1 -= &step.w1;
        self.b1 -= &step.b1;
        self.w2 -= &step.w2;
        self.b2 -= &step.b2;
    }
}

/// Adam optimizer state for a `TemporalClassifier`.
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    m: Gradients,
    v: Gradients,
}

impl Adam {
    pub fn new(model: &TemporalClassifier, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            m: Gradients::zeros_like(model),
            v: Gradients::zeros_like(model),
        }
    }

    pub fn update(&mut self, model: &mut TemporalClassifier, grads: &Gradients) {
        self.step = self.step.saturating_add(1);
        let correction1 = 1.0 - self.beta1.powi(self.step);
        let correction2 = 1.0 - self.beta2.powi(self.step);
        let lr = self.learning_rate;
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);

        let delta = |m: &mut [f64], v: &mut [f64], g: &[f64]| -> Vec<f64> {
            m.iter_mut()
                .zip(v.iter_mut())
                .zip(g.iter())
                .map(|((m, v), g)| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    let m_hat = *m / correction1;
                    let v_hat = *v / correction2;
                    lr * m_hat / (v_hat.sqrt() + eps)
                })
                .collect()
        };

        let step = Gradients {
            w1: DMatrix::from_vec(
                grads.w1.nrows(),
                grads.w1.ncols(),
                delta(self.m.w1.as_mut_slice(), self.v.w1.as_mut_slice(), grads.w1.as_slice()),
            ),
            b1: DVector::from_vec(delta(
                self.m.b1.as_mut_slice(),
                self.v.b1.as_mut_slice(),
                grads.b1.as_slice(),
            )),
            w2: DMatrix::from_vec(
                grads.w2.nrows(),
                grads.w2.ncols(),
                delta(self.m.w2.as_mut_slice(), self.v.w2.as_mut_slice(), grads.w2.as_slice()),
            ),
            b2: DVector::from_vec(delta(
                self.m.b2.as_mut_slice(),
                self.v.b2.as_mut_slice(),
                grads.b2.as_slice(),
            )),
        };
        model.apply(&step);
    }
}

pub fn softmax(logits: &DVector<f64>) -> DVector<f64> {
    let max = logits.max();
    let exp = logits.map(|x| (x - max).exp());
    let total = exp.sum();
    exp / total
}

pub fn argmax(values: &DVector<f64>) -> usize {
    values.argmax().0
}

fn xavier(rows: usize, cols: usize, rng: &mut SeededRng) -> DMatrix<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    DMatrix::from_fn(rows, cols, |_, _| rng.uniform(-limit, limit))
}

/// SplitMix64; deterministic for a given seed so training runs reproduce.
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }

    /// Fisher-Yates.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = (self.next_u64() % (i as u64 + 1)) as usize;
            items.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence(value: f64, frames: usize, features: usize) -> Vec<DVector<f64>> {
        (0..frames)
            .map(|i| DVector::from_element(features, value + i as f64 * 0.01))
            .collect()
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&DVector::from_vec(vec![1000.0, 1001.0, 999.0]));
        assert!((p.sum() - 1.0).abs() < 1e-12);
        assert_eq!(argmax(&p), 1);
    }

    #[test]
    fn test_encode_shape_and_motion_term() {
        let mut rng = SeededRng::new(1);
        let model = TemporalClassifier::new(2, 3, 4, 2, &mut rng);
        let seq: Vec<DVector<f64>> = (0..6).map(|i| DVector::from_element(2, i as f64)).collect();
        let x = model.encode(&seq);
        assert_eq!(x.len(), 8);
        // Segments cover frames [0,2), [2,4), [4,6).
        assert_eq!(x[0], 0.5);
        assert_eq!(x[4], 4.5);
        assert_eq!(x[6], 4.0);
    }

    #[test]
    fn test_encode_shorter_than_segments() {
        let mut rng = SeededRng::new(1);
        let model = TemporalClassifier::new(2, 3, 4, 2, &mut rng);
        let x = model.encode(&sequence(1.0, 1, 2));
        assert_eq!(x.len(), 8);
        assert!(x.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_weights_round_trip() {
        let mut rng = SeededRng::new(7);
        let model = TemporalClassifier::new(3, 2, 5, 4, &mut rng);
        let restored = TemporalClassifier::from_weights(&model.to_weights()).unwrap();
        let seq = sequence(0.3, 10, 3);
        assert_eq!(model.predict_proba(&seq), restored.predict_proba(&seq));
    }

    #[test]
    fn test_from_weights_rejects_bad_shape() {
        let mut rng = SeededRng::new(7);
        let mut weights = TemporalClassifier::new(3, 2, 5, 4, &mut rng).to_weights();
        weights.b2.pop();
        assert!(TemporalClassifier::from_weights(&weights).is_err());
    }

    #[test]
    fn test_adam_reduces_loss() {
        let mut rng = SeededRng::new(3);
        let mut model = TemporalClassifier::new(4, 2, 8, 2, &mut rng);
        let a = model.encode(&sequence(-1.0, 6, 4));
        let b = model.encode(&sequence(1.0, 6, 4));
        let batch = vec![(&a, 0usize), (&b, 1usize)];

        let (before, _) = model.evaluate(&batch);
        let mut adam = Adam::new(&model, 0.05);
        for _ in 0..50 {
            let (grads, _, _) = model.batch_gradients(&batch);
            adam.update(&mut model, &grads);
        }
        let (after, correct) = model.evaluate(&batch);
        assert!(after < before, "loss {} -> {}", before, after);
        assert_eq!(correct, 2);
    }

    #[test]
    fn test_rng_is_deterministic() {
        let mut a = SeededRng::new(42);
        let mut b = SeededRng::new(42);
        let mut xs: Vec<u32> = (0..20).collect();
        let mut ys = xs.clone();
        a.shuffle(&mut xs);
        b.shuffle(&mut ys);
        assert_eq!(xs, ys);
        let u = a.uniform(-0.5, 0.5);
        assert!((-0.5..0.5).contains(&u));
    }
}
