//! Bottleneck-block ResNet classifier.
//!
//! Follows the standard resnet-101 recipe: 7x7/2 stem, 3x3/2 max pool, four
//! bottleneck stages of [3, 4, 23, 3] blocks with expansion 4, global
//! average pooling, and a replaceable linear head.

use ndarray::{Array2, Array4};
use rand::Rng;

use crate::layers::{
    BatchNorm2d, BufferVisitor, Conv2d, GlobalAvgPool, Linear, MaxPool2d, ParamVisitor, Relu,
    Visitable,
};

const EXPANSION: usize = 4;
const STAGE_WIDTHS: [usize; 4] = [64, 128, 256, 512];
const STAGE_STRIDES: [usize; 4] = [1, 2, 2, 2];

/// One pre-activationless bottleneck: 1x1 reduce, 3x3 (strided), 1x1 expand,
/// with an optional projection shortcut.
pub struct Bottleneck {
    conv1: Conv2d,
    bn1: BatchNorm2d,
    relu1: Relu,
    conv2: Conv2d,
    bn2: BatchNorm2d,
    relu2: Relu,
    conv3: Conv2d,
    bn3: BatchNorm2d,
    down: Option<(Conv2d, BatchNorm2d)>,
    relu_out: Relu,
}

impl Bottleneck {
    fn new<R: Rng>(c_in: usize, width: usize, stride: usize, rng: &mut R) -> Self {
        let c_out = width * EXPANSION;

        let down = if stride != 1 || c_in != c_out {
            Some((
                Conv2d::new(c_in, c_out, 1, stride, 0, rng),
                BatchNorm2d::new(c_out),
            ))
        } else {
            None
        };

        Self {
            conv1: Conv2d::new(c_in, width, 1, 1, 0, rng),
            bn1: BatchNorm2d::new(width),
            relu1: Relu::new(),
            conv2: Conv2d::new(width, width, 3, stride, 1, rng),
            bn2: BatchNorm2d::new(width),
            relu2: Relu::new(),
            conv3: Conv2d::new(width, c_out, 1, 1, 0, rng),
            bn3: BatchNorm2d::new(c_out),
            down,
            relu_out: Relu::new(),
        }
    }

    fn forward(&mut self, x: &Array4<f32>, train: bool) -> Array4<f32> {
        let mut out = self.conv1.forward(x);
        out = self.bn1.forward(&out, train);
        out = self.relu1.forward(out);

        out = self.conv2.forward(&out);
        out = self.bn2.forward(&out, train);
        out = self.relu2.forward(out);

        out = self.conv3.forward(&out);
        out = self.bn3.forward(&out, train);

        let shortcut = match &mut self.down {
            Some((conv, bn)) => {
                let s = conv.forward(x);
                bn.forward(&s, train)
            }
            None => x.clone(),
        };

        out += &shortcut;
        self.relu_out.forward(out)
    }

    fn backward(&mut self, dy: &Array4<f32>) -> Array4<f32> {
        let dsum = self.relu_out.backward(dy);

        // Main path.
        let mut dx = self.bn3.backward(&dsum);
        dx = self.conv3.backward(&dx);
        dx = self.relu2.backward(&dx);
        dx = self.bn2.backward(&dx);
        dx = self.conv2.backward(&dx);
        dx = self.relu1.backward(&dx);
        dx = self.bn1.backward(&dx);
        let mut dx = self.conv1.backward(&dx);

        // Shortcut path joins at the sum.
        match &mut self.down {
            Some((conv, bn)) => {
                let ds = bn.backward(&dsum);
                dx += &conv.backward(&ds);
            }
            None => dx += &dsum,
        }

        dx
    }

    fn visit_params(&mut self, name: &str, visitor: &mut dyn ParamVisitor) {
        self.conv1.visit_params(&format!("{name}.conv1.weight"), visitor);
        self.bn1.visit_params(&format!("{name}.bn1"), visitor);
        self.conv2.visit_params(&format!("{name}.conv2.weight"), visitor);
        self.bn2.visit_params(&format!("{name}.bn2"), visitor);
        self.conv3.visit_params(&format!("{name}.conv3.weight"), visitor);
        self.bn3.visit_params(&format!("{name}.bn3"), visitor);

        if let Some((conv, bn)) = &mut self.down {
            conv.visit_params(&format!("{name}.downsample.0.weight"), visitor);
            bn.visit_params(&format!("{name}.downsample.1"), visitor);
        }
    }

    fn visit_buffers(&mut self, name: &str, visitor: &mut dyn BufferVisitor) {
        self.bn1.visit_buffers(&format!("{name}.bn1"), visitor);
        self.bn2.visit_buffers(&format!("{name}.bn2"), visitor);
        self.bn3.visit_buffers(&format!("{name}.bn3"), visitor);

        if let Some((_, bn)) = &mut self.down {
            bn.visit_buffers(&format!("{name}.downsample.1"), visitor);
        }
    }
}

/// The full classifier. `resnet101` is the production configuration; the
/// block counts stay configurable so tests can build small variants.
pub struct ResNet {
    conv1: Conv2d,
    bn1: BatchNorm2d,
    relu: Relu,
    maxpool: MaxPool2d,
    stages: Vec<Vec<Bottleneck>>,
    avgpool: GlobalAvgPool,
    fc: Linear,
}

impl ResNet {
    /// Builds a bottleneck ResNet with the given per-stage block counts.
    pub fn new<R: Rng>(blocks: [usize; 4], num_classes: usize, rng: &mut R) -> Self {
        let mut stages = Vec::with_capacity(4);
        let mut c_in = 64;

        for (stage, &count) in blocks.iter().enumerate() {
            let width = STAGE_WIDTHS[stage];
            let mut blocks = Vec::with_capacity(count);

            for block in 0..count {
                let stride = if block == 0 { STAGE_STRIDES[stage] } else { 1 };
                blocks.push(Bottleneck::new(c_in, width, stride, rng));
                c_in = width * EXPANSION;
            }

            stages.push(blocks);
        }

        Self {
            conv1: Conv2d::new(3, 64, 7, 2, 3, rng),
            bn1: BatchNorm2d::new(64),
            relu: Relu::new(),
            maxpool: MaxPool2d::new(3, 2, 1),
            stages,
            avgpool: GlobalAvgPool::new(),
            fc: Linear::new(STAGE_WIDTHS[3] * EXPANSION, num_classes, rng),
        }
    }

    /// The 101-layer configuration with the head replaced for `num_classes`.
    pub fn resnet101<R: Rng>(num_classes: usize, rng: &mut R) -> Self {
        Self::new([3, 4, 23, 3], num_classes, rng)
    }

    /// Forward pass producing (batch, num_classes) logits.
    pub fn forward(&mut self, x: &Array4<f32>, train: bool) -> Array2<f32> {
        let mut out = self.conv1.forward(x);
        out = self.bn1.forward(&out, train);
        out = self.relu.forward(out);
        out = self.maxpool.forward(&out);

        for stage in &mut self.stages {
            for block in stage.iter_mut() {
                out = block.forward(&out, train);
            }
        }

        let pooled = self.avgpool.forward(&out);
        self.fc.forward(pooled)
    }

    /// Backward pass from the logits gradient; accumulates parameter
    /// gradients for the optimizer.
    pub fn backward(&mut self, dlogits: &Array2<f32>) {
        let dpool = self.fc.backward(dlogits);
        let mut dout = self.avgpool.backward(&dpool);

        for stage in self.stages.iter_mut().rev() {
            for block in stage.iter_mut().rev() {
                dout = block.backward(&dout);
            }
        }

        let dout = self.maxpool.backward(&dout);
        let dout = self.relu.backward(&dout);
        let dout = self.bn1.backward(&dout);
        self.conv1.backward(&dout);
    }
}

impl Visitable for ResNet {
    fn visit_params(&mut self, visitor: &mut dyn ParamVisitor) {
        self.conv1.visit_params("conv1.weight", visitor);
        self.bn1.visit_params("bn1", visitor);

        for (stage, blocks) in self.stages.iter_mut().enumerate() {
            for (block, b) in blocks.iter_mut().enumerate() {
                b.visit_params(&format!("layer{}.{block}", stage + 1), visitor);
            }
        }

        self.fc.visit_params("fc", visitor);
    }

    fn visit_buffers(&mut self, visitor: &mut dyn BufferVisitor) {
        self.bn1.visit_buffers("bn1", visitor);

        for (stage, blocks) in self.stages.iter_mut().enumerate() {
            for (block, b) in blocks.iter_mut().enumerate() {
                b.visit_buffers(&format!("layer{}.{block}", stage + 1), visitor);
            }
        }
    }
}
