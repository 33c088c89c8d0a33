use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// XLM-R `<pad>`.
pub const PAD_ID: u32 = 1;

/// One text as fixed-length model input. `ids`/`mask` stay on the host for
/// sparse pooling.
pub struct Tokenized {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub ids: Vec<u32>,
    pub mask: Vec<u32>,
}

impl Tokenized {
    pub fn encode(
        tokenizer: &Tokenizer,
        text: &str,
        max_len: usize,
        device: &Device,
    ) -> Result<Self> {
        let enc = tokenizer.encode(text, true).map_err(|e| anyhow!("tokenization failed: {e}"))?;
        let (ids, mask) = fit(enc.get_ids(), enc.get_attention_mask(), max_len);
        let input_ids = Tensor::new(ids.as_slice(), device)?.reshape((1, max_len))?;
        let attention_mask = Tensor::new(mask.as_slice(), device)?.reshape((1, max_len))?;
        Ok(Self { input_ids, attention_mask, ids, mask })
    }
}

/// Truncates or pads (with `PAD_ID`, mask 0) to exactly `max_len`.
fn fit(ids: &[u32], mask: &[u32], max_len: usize) -> (Vec<u32>, Vec<u32>) {
    let keep = ids.len().min(max_len);
    let mut ids = ids[..keep].to_vec();
    let mut mask = mask[..keep.min(mask.len())].to_vec();
    mask.resize(keep, 1);
    ids.resize(max_len, PAD_ID);
    mask.resize(max_len, 0);
    (ids, mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_and_truncates() {
        let (ids, mask) = fit(&[0, 5, 6, 2], &[1, 1, 1, 1], 6);
        assert_eq!(ids, vec![0, 5, 6, 2, PAD_ID, PAD_ID]);
        assert_eq!(mask, vec![1, 1, 1, 1, 0, 0]);

        let (ids, mask) = fit(&[0, 5, 6, 7, 8, 2], &[1; 6], 3);
        assert_eq!(ids, vec![0, 5, 6]);
        assert_eq!(mask, vec![1, 1, 1]);
    }
}
