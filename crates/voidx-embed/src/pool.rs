use anyhow::{ensure, Result};
use candle_core::{DType, Tensor};

/// Mean of the hidden states over unmasked tokens: `[B,T,H] -> [B,H]`.
pub fn masked_mean(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let dims = hidden.dims();
    ensure!(dims.len() == 3, "hidden shape must be [B,T,H], got {:?}", dims);
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let weights = mask.unsqueeze(2)?.broadcast_as(hidden.shape())?;
    let summed = (hidden * &weights)?.sum(1)?;
    // all-padding rows divide by 1 instead of 0
    let counts = mask.sum_keepdim(1)?.maximum(1.0)?;
    Ok(summed.broadcast_div(&counts)?)
}

/// Row-wise L2 normalization of a `[B,H]` tensor.
pub fn l2_normalize(x: &Tensor) -> Result<Tensor> {
    let eps = match x.dtype() {
        DType::F16 | DType::BF16 => 1e-6,
        _ => 1e-12,
    };
    let norm = (x.sqr()?.sum_keepdim(1)?.sqrt()? + eps)?;
    Ok(x.broadcast_div(&norm)?)
}

pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let pooled = l2_normalize(&masked_mean(hidden, attention_mask)?)?;
    let (b, _, h) = hidden.dims3()?;
    ensure!(pooled.dims() == [b, h], "pooled shape mismatch: {:?}", pooled.dims());
    Ok(pooled)
}
