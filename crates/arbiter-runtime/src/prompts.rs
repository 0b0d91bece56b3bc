//! Prompt templates for the judges.
//!
//! Each template asks for one JSON object whose fields match the judge's
//! reply schema in `arbiter-core/schemas`. The reply parser is lenient about
//! values but strict about shape, so the field names here must not drift.

use arbiter_core::{ConversationInput, HallucinationReport};

/// Previous-turn block, empty for single-turn conversations.
fn conversation_history(input: &ConversationInput) -> String {
    match input.previous_turn() {
        Some((question, answer)) => format!(
            "**PREVIOUS TURN (for context):**\nUser: {}\nAssistant: {}\n\n",
            question, answer
        ),
        None => String::new(),
    }
}

pub fn hallucination_prompt(input: &ConversationInput) -> String {
    format!(
        r#"You are a critical evaluator detecting hallucinations in the responses of an AI assistant.

Your task is to identify when the assistant made up information, mixed information incorrectly, or stated facts not supported by the provided documents.

**CONTEXT:**
{history}- User Question: {question}
- Assistant's Response: {response}
- Documents Used: {documents}

**NOTE:** If a previous turn is provided above, use it to understand context-dependent questions (e.g. "how does it work" may refer to something mentioned before).

**EVALUATION CRITERIA:**

1. **HALLUCINATION TYPES TO DETECT:**
   - Fabrication: information stated but NOT present in any document
   - Distortion: information from the documents but modified or exaggerated
   - Mixing: information from several documents combined incorrectly
   - Contradiction: the response contradicts the documents

2. **SEVERITY LEVELS:**
   - CRITICAL: false information that could harm the user (wrong procedure, incorrect amounts)
   - MAJOR: significant inaccuracy that misleads but causes no immediate harm
   - MINOR: small details incorrect, core message accurate
   - NONE: all information is grounded in the documents

3. **NOT HALLUCINATIONS:**
   - Asking for clarification when the documents lack the information
   - Saying the information is not available when the documents truly don't contain it
   - Politeness phrases
   - Rewording document content in clearer language

**OUTPUT FORMAT (JSON):**
{{
  "hallucination_detected": true/false,
  "severity": "critical" | "major" | "minor" | "none",
  "hallucination_type": "fabrication" | "distortion" | "mixing" | "contradiction" | "none",
  "evidence": [
    {{
      "claim": "Specific claim from the response",
      "status": "hallucination" | "grounded",
      "document_support": "Quote from a document or 'NOT FOUND'",
      "explanation": "Why this is or isn't a hallucination"
    }}
  ],
  "overall_assessment": "Brief explanation of your finding",
  "confidence": 0.0-1.0
}}

**INSTRUCTIONS:**
1. Extract ALL factual claims from the response
2. For EACH claim, search the documents for supporting evidence
3. Flag ANY claim without clear document support
4. Be strict: when in doubt, flag it
5. Quote the documents as evidence

**EVIDENCE RULES:**
- Every unsupported claim MUST appear in "evidence" with status "hallucination"
- If hallucination_detected is true, "evidence" MUST contain at least one claim with status "hallucination"
- The statuses in "evidence" must agree with overall_assessment

Begin your analysis:"#,
        history = conversation_history(input),
        question = input.user_question,
        response = input.ai_response,
        documents = input.documents,
    )
}

pub fn relevance_prompt(input: &ConversationInput) -> String {
    format!(
        r#"You are evaluating whether the retrieved documents are relevant to the user's question.

**CONTEXT:**
- User Question: {question}
- Documents Retrieved: {documents}

**YOUR TASK:**
Determine whether these documents contain the information needed to answer the question.

**OUTPUT FORMAT (JSON):**
{{
  "relevance_score": 1-5,
  "has_answer": true/false,
  "missing_information": ["What information is missing"],
  "relevant_documents": ["Documents that are relevant"],
  "irrelevant_documents": ["Documents that are NOT relevant"],
  "explanation": "Brief explanation"
}}

**SCORING:**
- 5: documents fully answer the question
- 4: documents mostly answer the question
- 3: documents have some relevant information
- 2: documents are barely relevant
- 1: documents are irrelevant

Begin your analysis:"#,
        question = input.user_question,
        documents = input.documents,
    )
}

pub fn completeness_prompt(input: &ConversationInput) -> String {
    format!(
        r#"You are evaluating whether the assistant's response is complete given the documents available.

**CONTEXT:**
{history}- User Question: {question}
- Assistant's Response: {response}
- Documents Available: {documents}

**YOUR TASK:**
Check whether the assistant used all relevant information from the documents to answer completely.

**OUTPUT FORMAT (JSON):**
{{
  "completeness_score": 1-5,
  "used_all_relevant_info": true/false,
  "missing_information": ["Important information from the documents NOT included in the response"],
  "unnecessary_clarification": true/false,
  "explanation": "What was missing or why clarification was unnecessary"
}}

**SCORING:**
- 5: complete answer using all relevant document information
- 4: mostly complete, minor details missing
- 3: partial answer, some important information missing
- 2: incomplete, major gaps
- 1: very incomplete, or only asks for clarification when the answer was available

**KEY CHECK:**
If the assistant asks for clarification but the documents clearly contain the answer, score 2 or lower and set unnecessary_clarification to true.

Begin your analysis:"#,
        history = conversation_history(input),
        question = input.user_question,
        response = input.ai_response,
        documents = input.documents,
    )
}

pub fn escalation_prompt(input: &ConversationInput) -> String {
    format!(
        r#"You are validating whether the decision to escalate (or not escalate) to a human expert was appropriate.

**CONTEXT:**
{history}- User Question: {question}
- Assistant's Response: {response}
- Documents Available: {documents}
- Escalated to Expert: {escalated}
- Escalation Reason: {reason}

**YOUR TASK:**
Determine whether the escalation decision was correct.

**OUTPUT FORMAT (JSON):**
{{
  "escalation_appropriate": true/false,
  "should_have_escalated": true/false,
  "reason": "Why escalation was or wasn't appropriate",
  "alternative_action": "What should have been done instead, if anything"
}}

**DECISION RULES:**
SHOULD escalate when:
- The question is ambiguous and clarification didn't help
- The documents don't contain the needed information
- The user gave negative feedback
- The issue is outside the assistant's scope

SHOULD NOT escalate when:
- The documents contain the answer
- The question only needs better retrieval
- The assistant could have asked a better clarifying question

Begin your analysis:"#,
        history = conversation_history(input),
        question = input.user_question,
        response = input.ai_response,
        documents = input.documents,
        escalated = if input.escalated { "yes" } else { "no" },
        reason = input
            .escalation_reason
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or("Not specified"),
    )
}

/// JSON view of a finding, in the hallucination judge's own field names.
fn finding_json(finding: &HallucinationReport) -> Result<String, serde_json::Error> {
    let verdict = &finding.verdict;
    let view = serde_json::json!({
        "hallucination_detected": verdict.detected,
        "severity": verdict.severity,
        "hallucination_type": verdict.hallucination_type,
        "evidence": verdict.evidence,
        "overall_assessment": finding.overall_assessment,
        "confidence": verdict.confidence,
    });
    serde_json::to_string_pretty(&view)
}

pub fn verification_prompt(
    input: &ConversationInput,
    finding: &HallucinationReport,
) -> Result<String, serde_json::Error> {
    Ok(format!(
        r#"You are a verification agent reviewing a potential hallucination detected by another evaluator.

**CONTEXT:**
- Original Finding: {finding}
- User Question: {question}
- Assistant's Response: {response}
- Documents: {documents}

**YOUR TASK:**
Verify whether the finding is correct or a false positive.

**OUTPUT FORMAT (JSON):**
{{
  "verified": true/false,
  "severity_adjustment": "none" | "increase" | "decrease",
  "new_severity": "critical" | "major" | "minor" | "none",
  "explanation": "Why you agree or disagree with the original finding",
  "final_recommendation": "approve" | "reject" | "review",
  "evidence": [
    {{
      "claim": "Claim you re-examined",
      "status": "hallucination" | "grounded",
      "document_support": "Quote from a document or 'NOT FOUND'",
      "explanation": "Your reasoning"
    }}
  ]
}}

"evidence" is optional; include it when your claim-by-claim view differs from the original finding.

**VERIFICATION CRITERIA:**
1. Re-examine ALL documents thoroughly
2. Check whether the original evaluator confused rewording with fabrication
3. Verify that the quoted evidence is accurate
4. Assess the severity realistically

Be thorough but fair. Only confirm hallucinations with strong evidence.

Begin your verification:"#,
        finding = finding_json(finding)?,
        question = input.user_question,
        response = input.ai_response,
        documents = input.documents,
    ))
}
