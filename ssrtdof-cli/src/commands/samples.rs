use ssrtdof_render::{RotationTexture, SampleSetGenerator};

pub fn run(seed: Option<u64>) -> anyhow::Result<()> {
    let mut generator = match seed {
        Some(seed) => SampleSetGenerator::seeded(seed),
        None => SampleSetGenerator::from_entropy(),
    };
    let (samples, rotations) = generator.generate();

    println!("# lens samples (x, y, radius)");
    for (i, s) in samples.samples().iter().enumerate() {
        println!("{i:2}  {:+.5}  {:+.5}  {:.5}", s.x, s.y, s.length());
    }

    println!("# rotation angles, {0}x{0}, radians", RotationTexture::SIZE);
    for row in rotations.angles().chunks(RotationTexture::SIZE as usize) {
        let line: Vec<String> = row.iter().map(|a| format!("{a:.3}")).collect();
        println!("{}", line.join(" "));
    }
    Ok(())
}
